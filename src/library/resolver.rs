//! Turns the selected playlist name into the ordered list of tracks on screen.

use tokio::sync::watch;

use super::types::{Playlist, TrackRef};

pub const FAVORITE_PLAYLIST: &str = "Favorite";
pub const ALL_PLAYLIST: &str = "All";

/// Computes the track list for `selected`.
///
/// Favorites and the "All" view win over any playlist that happens to share
/// their name; user playlists are searched before built-ins. Unknown names
/// yield an empty list.
pub fn resolve_tracks<'a, I>(
    selected: &str,
    favorites: &[TrackRef],
    user: &[Playlist],
    builtin: &[Playlist],
    metadata_keys: I,
) -> Vec<TrackRef>
where
    I: IntoIterator<Item = &'a TrackRef>,
{
    if selected == FAVORITE_PLAYLIST {
        return favorites.to_vec();
    }
    if selected == ALL_PLAYLIST {
        return metadata_keys.into_iter().cloned().collect();
    }
    user.iter()
        .chain(builtin.iter())
        .find(|playlist| playlist.name == selected)
        .map(|playlist| playlist.tracks.clone())
        .unwrap_or_default()
}

/// Publishes the displayed list, suppressing value-equal republishes.
pub struct PlaylistResolver {
    displayed: watch::Sender<Vec<TrackRef>>,
}

impl PlaylistResolver {
    pub fn new() -> Self {
        let (displayed, _) = watch::channel(Vec::new());
        Self { displayed }
    }

    /// Returns `true` when `tracks` differs from what was last published.
    pub fn publish(&self, tracks: Vec<TrackRef>) -> bool {
        self.displayed.send_if_modified(|current| {
            if *current == tracks {
                false
            } else {
                *current = tracks;
                true
            }
        })
    }

    pub fn current(&self) -> Vec<TrackRef> {
        self.displayed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<TrackRef>> {
        self.displayed.subscribe()
    }
}

impl Default for PlaylistResolver {
    fn default() -> Self {
        Self::new()
    }
}
