pub mod backend;
pub mod debounce;
pub mod document;
pub mod persistent;

pub use backend::{FileStore, KeyValueStore, MemoryStore};
pub use debounce::Debouncer;
pub use document::{DocumentPatch, MetadataEdit, MetadataMap, PersistedDocument};
pub use persistent::PersistentStore;
