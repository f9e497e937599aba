//! Wires the store, metadata cache, displayed-list resolver and playback
//! controller together.
//!
//! Every library edit reads the stored document fresh, changes only the
//! field it owns and writes it back right away. Metadata goes through the
//! cache's debounced path. After an edit, if the playing track left the
//! collection it was picked from, playback moves on within that collection.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::app::config::Settings;
use crate::error::LibraryError;
use crate::library::{
    resolve_tracks, Metadata, Playlist, PlaylistResolver, TrackRef, ALL_PLAYLIST,
    FAVORITE_PLAYLIST,
};
use crate::metadata::{default_reader, ByteSource, MetadataCache, ProxyFetcher, RangeFetcher};
use crate::player::{AudioOutput, PlaybackController, PlaybackEvent, PlaybackState};
use crate::store::{DocumentPatch, FileStore, PersistedDocument, PersistentStore};

pub struct Session {
    store: Arc<PersistentStore>,
    cache: Arc<MetadataCache>,
    resolver: PlaylistResolver,
    player: PlaybackController,
    builtin: Vec<Playlist>,
    selected: String,
    /// Document as of the last refresh. Used to find where the playing
    /// track sat before an external change removed it.
    last_seen: PersistedDocument,
}

impl Session {
    /// Starts on the first built-in playlist, or favorites when there is none.
    pub fn new(
        store: Arc<PersistentStore>,
        cache: Arc<MetadataCache>,
        builtin: Vec<Playlist>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        let selected = builtin
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| FAVORITE_PLAYLIST.to_string());
        let mut session = Self {
            store,
            cache,
            resolver: PlaylistResolver::new(),
            player: PlaybackController::new(output),
            builtin,
            selected,
            last_seen: PersistedDocument::default(),
        };
        session.refresh();
        session
    }

    /// Builds a session over the on-disk store described by `settings`.
    pub fn from_settings(settings: &Settings, output: Box<dyn AudioOutput>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        let fetcher: Arc<dyn ByteSource> = match &settings.proxy_url {
            Some(endpoint) => Arc::new(ProxyFetcher::new(
                client,
                endpoint.clone(),
                settings.prefix_bytes,
            )),
            None => Arc::new(RangeFetcher::new(client, settings.prefix_bytes)),
        };

        let backend = Arc::new(FileStore::new(Settings::state_dir()));
        let store = Arc::new(PersistentStore::new(backend, settings.storage_key.clone()));
        let cache = Arc::new(MetadataCache::new(
            Arc::clone(&store),
            fetcher,
            default_reader(),
            settings.save_debounce(),
        ));
        info!(key = %settings.storage_key, "session opened");
        Ok(Self::new(store, cache, settings.playlists.clone(), output))
    }

    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn player(&self) -> &PlaybackController {
        &self.player
    }

    pub fn playback(&self) -> &PlaybackState {
        self.player.state()
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    // ---- displayed list ----

    /// Shows `name`. Playback is left alone.
    pub fn select_playlist(&mut self, name: impl Into<String>) {
        self.selected = name.into();
        debug!(playlist = %self.selected, "playlist selected");
        self.refresh();
    }

    pub fn displayed(&self) -> Vec<TrackRef> {
        self.resolver.current()
    }

    pub fn subscribe_displayed(&self) -> watch::Receiver<Vec<TrackRef>> {
        self.resolver.subscribe()
    }

    /// Recomputes the displayed list. When it changed, metadata resolution
    /// is started for each of its tracks.
    pub fn refresh(&mut self) -> bool {
        let doc = self.store.read();
        let tracks = self.collection(&self.selected, &doc);
        self.last_seen = doc;

        if !self.resolver.publish(tracks.clone()) {
            return false;
        }
        for track in &tracks {
            self.cache.resolve(track);
        }
        true
    }

    /// Names in sidebar order: "All", "Favorite", built-ins, then user
    /// playlists.
    pub fn playlist_names(&self) -> Vec<String> {
        let doc = self.store.read();
        [ALL_PLAYLIST, FAVORITE_PLAYLIST]
            .into_iter()
            .map(str::to_string)
            .chain(self.builtin.iter().map(|p| p.name.clone()))
            .chain(doc.playlists.into_iter().map(|p| p.name))
            .collect()
    }

    pub fn metadata_for(&self, track: &TrackRef) -> Option<Metadata> {
        self.cache.get(track)
    }

    /// Resolves metadata for every displayed track and waits for all of
    /// them. Returns how many now have an entry.
    pub async fn resolve_displayed(&mut self) -> usize {
        let tracks = self.displayed();
        let cache = Arc::clone(&self.cache);
        let results = join_all(tracks.iter().map(|t| cache.resolve_now(t))).await;
        self.refresh();
        results.iter().filter(|m| m.is_some()).count()
    }

    // ---- playback ----

    /// Plays the track at `index` of the displayed list.
    pub fn play_index(&mut self, index: usize) -> bool {
        let Some(track) = self.displayed().get(index).cloned() else {
            return false;
        };
        self.player.select_track(track);
        self.player.set_source(self.selected.clone());
        true
    }

    pub fn next(&mut self) -> bool {
        let moved = self.player.next(&self.displayed());
        if moved {
            self.player.set_source(self.selected.clone());
        }
        moved
    }

    pub fn previous(&mut self) -> bool {
        let moved = self.player.previous(&self.displayed());
        if moved {
            self.player.set_source(self.selected.clone());
        }
        moved
    }

    pub fn toggle_play_pause(&mut self) {
        self.player.toggle_play_pause();
    }

    pub fn toggle_loop(&mut self) {
        self.player.toggle_loop();
    }

    pub fn seek(&mut self, target_secs: f64) {
        self.player.seek(target_secs);
    }

    pub fn handle_event(&mut self, event: PlaybackEvent) {
        let displayed = self.displayed();
        let before = self.player.playing_track().cloned();
        self.player.handle_event(event, &displayed);

        let after = self.player.playing_track();
        if after.is_some() && after != before.as_ref() {
            self.player.set_source(self.selected.clone());
        }
    }

    // ---- favorites ----

    pub fn is_favorite(&self, url: &str) -> bool {
        self.store
            .read()
            .favorite_playlist
            .iter()
            .any(|t| t.as_str() == url)
    }

    /// Returns false when the track already was a favorite.
    pub fn add_favorite(&mut self, url: &str) -> bool {
        let track = TrackRef::new(url);
        let mut favorites = self.store.read().favorite_playlist;
        if favorites.contains(&track) {
            return false;
        }
        favorites.push(track.clone());
        self.store.merge_write(DocumentPatch::favorites(favorites));
        self.cache.resolve(&track);
        self.refresh();
        true
    }

    pub fn remove_favorite(&mut self, url: &str) -> bool {
        let track = TrackRef::new(url);
        let before = self.source_snapshot();
        let mut favorites = self.store.read().favorite_playlist;
        let len = favorites.len();
        favorites.retain(|t| t != &track);
        if favorites.len() == len {
            return false;
        }
        self.store.merge_write(DocumentPatch::favorites(favorites));
        self.collect_garbage(&track);
        self.reconcile(before);
        self.refresh();
        true
    }

    /// Flips favorite status. Returns whether the track is now a favorite.
    pub fn toggle_favorite(&mut self, url: &str) -> bool {
        if self.is_favorite(url) {
            self.remove_favorite(url);
            false
        } else {
            self.add_favorite(url);
            true
        }
    }

    // ---- user playlists ----

    pub fn create_playlist(&mut self, name: &str) -> Result<(), LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::EmptyName);
        }
        if self.is_reserved(name) {
            return Err(LibraryError::ReservedName(name.to_string()));
        }
        let mut doc = self.store.read();
        if doc.user_playlist(name).is_some() {
            return Err(LibraryError::DuplicateName(name.to_string()));
        }
        doc.playlists.push(Playlist::new(name));
        self.store.merge_write(DocumentPatch::playlists(doc.playlists));
        info!(playlist = %name, "playlist created");
        self.refresh();
        Ok(())
    }

    /// Deletes a user playlist. If it was on screen, the selection falls
    /// back to the first user playlist, the first built-in, or favorites.
    pub fn delete_playlist(&mut self, name: &str) -> Result<(), LibraryError> {
        if self.is_reserved(name) {
            return Err(LibraryError::ReadOnly(name.to_string()));
        }
        let before = self.source_snapshot();
        let mut playlists = self.store.read().playlists;
        let Some(index) = playlists.iter().position(|p| p.name == name) else {
            return Err(LibraryError::UnknownPlaylist(name.to_string()));
        };
        let removed = playlists.remove(index);
        self.store.merge_write(DocumentPatch::playlists(playlists.clone()));
        info!(playlist = %name, "playlist deleted");

        let mut seen = Vec::new();
        for track in removed.tracks {
            if !seen.contains(&track) {
                self.collect_garbage(&track);
                seen.push(track);
            }
        }
        self.reconcile(before);

        if self.selected == name {
            self.selected = playlists
                .first()
                .or_else(|| self.builtin.first())
                .map(|p| p.name.clone())
                .unwrap_or_else(|| FAVORITE_PLAYLIST.to_string());
        }
        self.refresh();
        Ok(())
    }

    /// Appends `url` to a user playlist. Blank input is ignored.
    pub fn add_track(&mut self, playlist: &str, url: &str) -> Result<(), LibraryError> {
        self.ensure_writable(playlist)?;
        let url = url.trim();
        let mut doc = self.store.read();
        let Some(target) = doc.user_playlist_mut(playlist) else {
            return Err(LibraryError::UnknownPlaylist(playlist.to_string()));
        };
        if url.is_empty() {
            return Ok(());
        }
        let track = TrackRef::new(url);
        target.tracks.push(track.clone());
        self.store.merge_write(DocumentPatch::playlists(doc.playlists));
        self.cache.resolve(&track);
        self.refresh();
        Ok(())
    }

    /// Removes the entry at `index` of a user playlist or of favorites.
    /// An out-of-range index is a no-op.
    pub fn remove_track(&mut self, playlist: &str, index: usize) -> Result<(), LibraryError> {
        if playlist == FAVORITE_PLAYLIST {
            let before = self.source_snapshot();
            let mut favorites = self.store.read().favorite_playlist;
            if index < favorites.len() {
                let track = favorites.remove(index);
                self.store.merge_write(DocumentPatch::favorites(favorites));
                self.collect_garbage(&track);
                self.reconcile(before);
                self.refresh();
            }
            return Ok(());
        }

        self.ensure_writable(playlist)?;
        let before = self.source_snapshot();
        let mut doc = self.store.read();
        let Some(target) = doc.user_playlist_mut(playlist) else {
            return Err(LibraryError::UnknownPlaylist(playlist.to_string()));
        };
        if index >= target.tracks.len() {
            return Ok(());
        }
        let track = target.tracks.remove(index);
        self.store.merge_write(DocumentPatch::playlists(doc.playlists));
        self.collect_garbage(&track);
        self.reconcile(before);
        self.refresh();
        Ok(())
    }

    /// Removes `url` from favorites and every user playlist, and drops its
    /// metadata unless a built-in playlist still lists it.
    pub fn forget(&mut self, url: &str) -> bool {
        let track = TrackRef::new(url);
        let before = self.source_snapshot();
        let mut doc = self.store.read();

        let mut touched = false;
        let len = doc.favorite_playlist.len();
        doc.favorite_playlist.retain(|t| t != &track);
        touched |= doc.favorite_playlist.len() != len;
        for playlist in &mut doc.playlists {
            let len = playlist.tracks.len();
            playlist.tracks.retain(|t| t != &track);
            touched |= playlist.tracks.len() != len;
        }
        if touched {
            self.store.merge_write(
                DocumentPatch::favorites(doc.favorite_playlist).with_playlists(doc.playlists),
            );
        }

        let held = self.builtin.iter().any(|p| p.contains(&track));
        let dropped = !held && self.cache.forget(&track);
        if dropped {
            self.store.flush();
        }
        info!(track = %track, dropped, "track forgotten");

        self.reconcile(before);
        self.refresh();
        touched || dropped
    }

    // ---- external changes ----

    /// Takes in a document another writer stored: adopts new metadata
    /// entries, drops the ones it deleted and re-derives the displayed list.
    /// Returns how many metadata entries were adopted.
    pub fn sync_from_store(&mut self, doc: &PersistedDocument) -> usize {
        let before = self
            .player
            .source()
            .map(|source| self.collection(source, &self.last_seen));
        let adopted = self.cache.absorb(&doc.metadata);
        let dropped = self.cache.prune(&doc.metadata);
        if adopted > 0 || dropped > 0 {
            debug!(adopted, dropped, "synced external metadata");
        }
        self.reconcile(before);
        self.refresh();
        adopted
    }

    /// Persists anything pending and stops metadata publishing.
    pub fn shutdown(&self) {
        self.cache.release();
        self.store.flush();
        debug!("session closed");
    }

    // ---- internals ----

    fn collection(&self, name: &str, doc: &PersistedDocument) -> Vec<TrackRef> {
        let keys = self.cache.keys();
        resolve_tracks(
            name,
            &doc.favorite_playlist,
            &doc.playlists,
            &self.builtin,
            &keys,
        )
    }

    fn source_snapshot(&self) -> Option<Vec<TrackRef>> {
        let source = self.player.source()?;
        Some(self.collection(source, &self.store.read()))
    }

    /// Moves playback on if the playing track was in `before` (its source
    /// collection prior to an edit) and is gone from it now.
    fn reconcile(&mut self, before: Option<Vec<TrackRef>>) {
        let (Some(before), Some(playing), Some(source)) = (
            before,
            self.player.playing_track().cloned(),
            self.player.source().map(str::to_string),
        ) else {
            return;
        };
        let Some(index) = before.iter().position(|t| t == &playing) else {
            return;
        };
        let after = self.collection(&source, &self.store.read());
        if after.contains(&playing) {
            return;
        }
        self.player.on_track_removed(index, &after);
    }

    /// Drops cached metadata for `track` once nothing lists it anymore.
    fn collect_garbage(&self, track: &TrackRef) {
        let doc = self.store.read();
        let referenced = doc.favorite_playlist.contains(track)
            || doc.playlists.iter().any(|p| p.contains(track))
            || self.builtin.iter().any(|p| p.contains(track));
        if !referenced && self.cache.forget(track) {
            self.store.flush();
        }
    }

    fn is_reserved(&self, name: &str) -> bool {
        name == ALL_PLAYLIST
            || name == FAVORITE_PLAYLIST
            || self.builtin.iter().any(|p| p.name == name)
    }

    fn ensure_writable(&self, playlist: &str) -> Result<(), LibraryError> {
        if self.is_reserved(playlist) {
            Err(LibraryError::ReadOnly(playlist.to_string()))
        } else {
            Ok(())
        }
    }
}
