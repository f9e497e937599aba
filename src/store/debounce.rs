//! A cancelable, reschedulable delayed task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::util::lock;

struct Slot<T> {
    generation: u64,
    pending: Option<T>,
    task: Option<JoinHandle<()>>,
}

/// Holds at most one pending value. Scheduling again replaces the value and
/// restarts the delay; only the newest timer may flush.
pub struct Debouncer<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                pending: None,
                task: None,
            })),
        }
    }

    /// Runs `flush(value)` after `delay` unless superseded or cancelled first.
    /// Returns `true` if an earlier pending value was dropped.
    pub fn schedule<F>(&self, value: T, delay: Duration, flush: F) -> bool
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.schedule_merged(value, delay, |_, newer| newer, flush)
    }

    /// Like [`schedule`](Self::schedule), but a pending value is combined
    /// with the new one through `merge(pending, value)` instead of dropped.
    pub fn schedule_merged<M, F>(&self, value: T, delay: Duration, merge: M, flush: F) -> bool
    where
        M: FnOnce(T, T) -> T,
        F: FnOnce(T) + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        let superseded = slot.pending.is_some();
        let value = match slot.pending.take() {
            Some(pending) => merge(pending, value),
            None => value,
        };
        slot.pending = Some(value);
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let shared = Arc::clone(&self.slot);
        slot.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let value = {
                let mut slot = lock(&shared);
                if slot.generation != generation {
                    return;
                }
                slot.task = None;
                slot.pending.take()
            };
            if let Some(value) = value {
                flush(value);
            }
        }));
        superseded
    }

    /// Stops the timer and hands back the pending value, if any.
    pub fn take(&self) -> Option<T> {
        let mut slot = lock(&self.slot);
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }

    /// Looks at the pending value without disturbing the timer.
    pub fn peek<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(lock(&self.slot).pending.as_ref())
    }
}

impl<T: Send + 'static> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new()
    }
}
