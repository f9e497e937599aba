//! Tag extraction from a track's leading bytes.

use std::sync::Arc;

use base64::prelude::*;
use futures::future::BoxFuture;

use crate::library::{Metadata, TrackRef, UNKNOWN_ARTIST};

/// Encoder input is fed in slices of this many bytes. A multiple of three, so
/// the encoded pieces concatenate with no padding in between.
const ENCODE_CHUNK: usize = 3 * 0x2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPicture {
    /// Declared image MIME type, e.g. `image/jpeg`.
    pub format: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFields {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub picture: Option<TagPicture>,
}

/// What the tag reader made of the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Resolved(TagFields),
    Unavailable,
}

pub trait TagReader: Send + Sync {
    fn read(&self, bytes: Vec<u8>) -> BoxFuture<'_, TagOutcome>;
}

/// Builds display metadata from tag fields, filling gaps from the URL.
pub fn metadata_from_tags(track: &TrackRef, fields: TagFields) -> Metadata {
    let title = fields
        .title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| track.file_name());
    let artist = fields
        .artist
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
    let picture = fields
        .picture
        .filter(|p| !p.data.is_empty())
        .map(|p| picture_data_uri(&p.format, &p.data));

    Metadata {
        title,
        artist,
        picture,
    }
}

/// `data:<format>;base64,<payload>`, encoded in bounded chunks.
pub fn picture_data_uri(format: &str, data: &[u8]) -> String {
    let mut uri = String::with_capacity(format.len() + 13 + data.len().div_ceil(3) * 4);
    uri.push_str("data:");
    uri.push_str(format);
    uri.push_str(";base64,");
    for chunk in data.chunks(ENCODE_CHUNK) {
        BASE64_STANDARD.encode_string(chunk, &mut uri);
    }
    uri
}

/// The reader compiled into this build, if any.
pub fn default_reader() -> Option<Arc<dyn TagReader>> {
    #[cfg(feature = "tags")]
    {
        Some(Arc::new(lofty_reader::LoftyTagReader))
    }
    #[cfg(not(feature = "tags"))]
    {
        None
    }
}

#[cfg(feature = "tags")]
pub use lofty_reader::LoftyTagReader;

#[cfg(feature = "tags")]
mod lofty_reader {
    use std::io::Cursor;

    use futures::future::{BoxFuture, FutureExt};
    use lofty::config::ParseOptions;
    use lofty::file::TaggedFileExt;
    use lofty::picture::PictureType;
    use lofty::probe::Probe;
    use lofty::tag::{Accessor, Tag};
    use tracing::debug;

    use super::{TagFields, TagOutcome, TagPicture, TagReader};

    const UNKNOWN_IMAGE_FORMAT: &str = "application/octet-stream";

    /// Parses ID3/Vorbis/MP4 tags with `lofty` on the blocking pool.
    pub struct LoftyTagReader;

    impl TagReader for LoftyTagReader {
        fn read(&self, bytes: Vec<u8>) -> BoxFuture<'_, TagOutcome> {
            async move {
                match tokio::task::spawn_blocking(move || parse(bytes)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        debug!(error = %e, "tag parse task failed");
                        TagOutcome::Unavailable
                    }
                }
            }
            .boxed()
        }
    }

    fn parse(bytes: Vec<u8>) -> TagOutcome {
        // Only a prefix of the file is present, so skip audio properties
        let options = ParseOptions::new().read_properties(false);
        let tagged_file = match Probe::new(Cursor::new(bytes))
            .options(options)
            .guess_file_type()
        {
            Ok(probe) => match probe.read() {
                Ok(file) => file,
                Err(e) => {
                    debug!(error = %e, "no readable tags");
                    return TagOutcome::Unavailable;
                }
            },
            Err(e) => {
                debug!(error = %e, "unrecognised audio format");
                return TagOutcome::Unavailable;
            }
        };

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return TagOutcome::Unavailable;
        };

        TagOutcome::Resolved(TagFields {
            title: tag.title().map(|t| t.into_owned()),
            artist: tag.artist().map(|a| a.into_owned()),
            picture: cover(tag),
        })
    }

    fn cover(tag: &Tag) -> Option<TagPicture> {
        let pictures = tag.pictures();
        let picture = pictures
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.first())?;

        Some(TagPicture {
            format: picture
                .mime_type()
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN_IMAGE_FORMAT.to_string()),
            data: picture.data().to_vec(),
        })
    }
}
