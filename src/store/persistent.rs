//! Read-merge-write access to the persisted document.
//!
//! Every write reloads the stored document immediately before merging, so a
//! writer only ever replaces the fields it owns. Writes that fail are logged
//! and dropped; the in-memory state of callers stays authoritative.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::backend::KeyValueStore;
use super::debounce::Debouncer;
use super::document::{DocumentPatch, PersistedDocument};
use crate::error::StoreError;
use crate::library::TrackRef;

pub struct PersistentStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    debouncer: Debouncer<DocumentPatch>,
}

impl PersistentStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            debouncer: Debouncer::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored document, or the empty one if absent or unreadable.
    pub fn read(&self) -> PersistedDocument {
        match self.backend.get(&self.key) {
            Ok(Some(raw)) => PersistedDocument::parse(&raw),
            Ok(None) => PersistedDocument::default(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read stored document");
                PersistedDocument::default()
            }
        }
    }

    /// Merges `patch` over the freshly read document and writes it back.
    pub fn try_merge_write(&self, patch: DocumentPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut doc = self.read();
        patch.apply_to(&mut doc);
        let raw = serde_json::to_string(&doc)?;
        self.backend.set(&self.key, &raw)
    }

    /// Like [`try_merge_write`](Self::try_merge_write) but never fails.
    pub fn merge_write(&self, patch: DocumentPatch) {
        if let Err(e) = self.try_merge_write(patch) {
            warn!(key = %self.key, error = %e, "failed to persist document");
        }
    }

    /// Writes `patch` after `delay` of quiet. A newer call replaces a pending
    /// patch instead of stacking another write.
    pub fn schedule_debounced_write(self: &Arc<Self>, patch: DocumentPatch, delay: Duration) {
        let store = Arc::clone(self);
        let superseded = self.debouncer.schedule(patch, delay, move |patch| {
            debug!(key = %store.key, "flushing debounced write");
            store.merge_write(patch);
        });
        if superseded {
            debug!(key = %self.key, "debounced write superseded");
        }
    }

    /// Like [`schedule_debounced_write`](Self::schedule_debounced_write),
    /// but folds `patch` into a pending one with [`DocumentPatch::then`], so
    /// metadata edits from a burst all reach the store.
    pub fn schedule_debounced_merge(self: &Arc<Self>, patch: DocumentPatch, delay: Duration) {
        let store = Arc::clone(self);
        self.debouncer.schedule_merged(patch, delay, DocumentPatch::then, move |patch| {
            debug!(key = %store.key, "flushing debounced write");
            store.merge_write(patch);
        });
    }

    /// Whether a pending write is about to add metadata for `track`.
    pub fn has_pending_upsert(&self, track: &TrackRef) -> bool {
        self.debouncer.peek(|pending| {
            pending.is_some_and(|patch| patch.pending_upserts().any(|t| t == track))
        })
    }

    pub fn has_pending_write(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Writes any pending debounced patch right away.
    pub fn flush(&self) {
        if let Some(patch) = self.debouncer.take() {
            debug!(key = %self.key, "flushing pending write early");
            self.merge_write(patch);
        }
    }

    /// Drops a pending debounced patch without writing it.
    pub fn cancel_pending(&self) -> bool {
        self.debouncer.take().is_some()
    }

    /// Polls the backend every `interval` and publishes the document whenever
    /// it differs from the last one seen. Stops once all receivers are gone.
    pub fn watch(self: &Arc<Self>, interval: Duration) -> watch::Receiver<PersistedDocument> {
        let (tx, rx) = watch::channel(self.read());
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let latest = store.read();
                tx.send_if_modified(|current| {
                    if *current == latest {
                        false
                    } else {
                        *current = latest;
                        true
                    }
                });
            }
        });
        rx
    }
}
