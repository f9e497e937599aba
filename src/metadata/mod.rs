pub mod cache;
pub mod fetch;
pub mod tags;

pub use cache::MetadataCache;
pub use fetch::{ByteSource, ProxyFetcher, RangeFetcher, DEFAULT_PREFIX_BYTES};
pub use tags::{default_reader, picture_data_uri, TagFields, TagOutcome, TagPicture, TagReader};
#[cfg(feature = "tags")]
pub use tags::LoftyTagReader;
