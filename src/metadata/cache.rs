//! Memoized, deduplicated track metadata resolution.
//!
//! At most one resolution is outstanding per TrackRef. Every failure path
//! (no tag reader, fetch error, unreadable tags) settles on the filename
//! fallback so that playback never waits on metadata.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::fetch::ByteSource;
use super::tags::{metadata_from_tags, TagOutcome, TagReader};
use crate::library::{Metadata, TrackRef};
use crate::store::{DocumentPatch, MetadataEdit, MetadataMap, PersistentStore};
use crate::util::lock;

#[derive(Default)]
struct CacheState {
    entries: MetadataMap,
    in_flight: HashSet<TrackRef>,
}

pub struct MetadataCache {
    state: Mutex<CacheState>,
    fetcher: Arc<dyn ByteSource>,
    reader: Option<Arc<dyn TagReader>>,
    store: Arc<PersistentStore>,
    save_delay: Duration,
    released: AtomicBool,
    resolved: broadcast::Sender<TrackRef>,
    /// Woken whenever a resolution leaves the in-flight set.
    settled: Notify,
}

impl MetadataCache {
    /// Starts from whatever metadata is already persisted.
    pub fn new(
        store: Arc<PersistentStore>,
        fetcher: Arc<dyn ByteSource>,
        reader: Option<Arc<dyn TagReader>>,
        save_delay: Duration,
    ) -> Self {
        let entries = store.read().metadata;
        let (resolved, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(CacheState {
                entries,
                in_flight: HashSet::new(),
            }),
            fetcher,
            reader,
            store,
            save_delay,
            released: AtomicBool::new(false),
            resolved,
            settled: Notify::new(),
        }
    }

    pub fn get(&self, track: &TrackRef) -> Option<Metadata> {
        lock(&self.state).entries.get(track).cloned()
    }

    pub fn contains(&self, track: &TrackRef) -> bool {
        lock(&self.state).entries.contains_key(track)
    }

    /// Cached tracks in first-resolution order.
    pub fn keys(&self) -> Vec<TrackRef> {
        lock(&self.state).entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    /// Notified with each TrackRef as its metadata is published.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackRef> {
        self.resolved.subscribe()
    }

    /// Resolves `track` in the background. Returns `None` when the entry is
    /// already cached, a resolution is already running, or the cache has
    /// been released.
    pub fn resolve(self: &Arc<Self>, track: &TrackRef) -> Option<JoinHandle<()>> {
        if !self.begin(track) {
            return None;
        }
        let cache = Arc::clone(self);
        let track = track.clone();
        Some(tokio::spawn(async move {
            let metadata = cache.lookup(&track).await;
            cache.finish(track, metadata);
        }))
    }

    /// Resolves `track` in place and returns the cached entry afterwards.
    /// If another resolution for the same track is running, waits for it
    /// instead of starting a second one.
    pub async fn resolve_now(&self, track: &TrackRef) -> Option<Metadata> {
        if self.begin(track) {
            let metadata = self.lookup(track).await;
            self.finish(track.clone(), metadata);
        } else {
            loop {
                let settled = self.settled.notified();
                if !lock(&self.state).in_flight.contains(track) {
                    break;
                }
                settled.await;
            }
        }
        self.get(track)
    }

    /// Drops the entry for `track` and schedules its removal from the store.
    pub fn forget(&self, track: &TrackRef) -> bool {
        let mut state = lock(&self.state);
        if state.entries.shift_remove(track).is_none() {
            return false;
        }
        self.store.schedule_debounced_merge(
            DocumentPatch::metadata_edit(MetadataEdit::remove(track.clone())),
            self.save_delay,
        );
        drop(state);
        debug!(track = %track, "metadata forgotten");
        true
    }

    /// Adopts entries written elsewhere (e.g. another process) without
    /// overwriting anything already cached.
    pub fn absorb(&self, incoming: &MetadataMap) -> usize {
        let mut state = lock(&self.state);
        let mut added = 0;
        for (track, metadata) in incoming {
            if !state.entries.contains_key(track) {
                state.entries.insert(track.clone(), metadata.clone());
                added += 1;
            }
        }
        added
    }

    /// Drops entries that are gone from the stored `incoming` map, unless
    /// they were resolved here and are still waiting to be written.
    pub fn prune(&self, incoming: &MetadataMap) -> usize {
        let mut state = lock(&self.state);
        let before = state.entries.len();
        state
            .entries
            .retain(|track, _| incoming.contains_key(track) || self.store.has_pending_upsert(track));
        before - state.entries.len()
    }

    /// Stops publishing. Resolutions still running finish without writing.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn begin(&self, track: &TrackRef) -> bool {
        if self.is_released() {
            return false;
        }
        let mut state = lock(&self.state);
        if state.entries.contains_key(track) || state.in_flight.contains(track) {
            return false;
        }
        state.in_flight.insert(track.clone());
        true
    }

    async fn lookup(&self, track: &TrackRef) -> Metadata {
        let Some(reader) = &self.reader else {
            debug!(track = %track, "no tag reader available, using filename");
            return Metadata::fallback(track);
        };

        let bytes = match self.fetcher.fetch_prefix(track.as_str()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(track = %track, error = %e, "metadata fetch failed");
                return Metadata::fallback(track);
            }
        };

        match reader.read(bytes).await {
            TagOutcome::Resolved(fields) => metadata_from_tags(track, fields),
            TagOutcome::Unavailable => {
                warn!(track = %track, "tags unreadable, using filename");
                Metadata::fallback(track)
            }
        }
    }

    fn finish(&self, track: TrackRef, metadata: Metadata) {
        let published = {
            let mut state = lock(&self.state);
            state.in_flight.remove(&track);
            let publish = !self.is_released() && !state.entries.contains_key(&track);
            if publish {
                state.entries.insert(track.clone(), metadata.clone());
                self.store.schedule_debounced_merge(
                    DocumentPatch::metadata_edit(MetadataEdit::upsert(track.clone(), metadata)),
                    self.save_delay,
                );
            }
            publish
        };
        self.settled.notify_waiters();

        if published {
            debug!(track = %track, "metadata resolved");
            let _ = self.resolved.send(track);
        }
    }
}
