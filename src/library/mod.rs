pub mod resolver;
pub mod types;

pub use resolver::{resolve_tracks, PlaylistResolver, ALL_PLAYLIST, FAVORITE_PLAYLIST};
pub use types::{Metadata, Playlist, TrackRef, UNKNOWN_ARTIST};
