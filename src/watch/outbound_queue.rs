use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::ConfigEntry;
use crate::ConfigId;
use crate::ConfigObject;

/// Outcome of pushing onto an [`OutboundQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The id had nothing pending; it now waits at the back of the queue
    Queued,
    /// A value was already pending for the id and has been replaced in place
    Coalesced,
}

/// Per-subscriber pending updates, coalesced by id
///
/// Pushing never blocks: a pending value for the same id is overwritten in
/// place, so a slow consumer only ever holds the latest value per id and sees
/// ids in the order they first became pending.
#[derive(Debug)]
pub struct OutboundQueue<C> {
    state: Mutex<QueueState<C>>,
    notify: Notify,
    /// Distinct pending ids past which a warning is logged; nothing is dropped
    warn_threshold: usize,
}

#[derive(Debug)]
struct QueueState<C> {
    pending: HashMap<ConfigId, C>,
    order: VecDeque<ConfigId>,
    /// Set once the threshold warning has been logged
    over_threshold: bool,
}

impl<C: ConfigObject> OutboundQueue<C> {
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: HashMap::new(),
                order: VecDeque::new(),
                over_threshold: false,
            }),
            notify: Notify::new(),
            warn_threshold,
        }
    }

    pub fn push(
        &self,
        entry: ConfigEntry<C>,
    ) -> Enqueued {
        let outcome = self.insert(entry);

        // Single consumer: a stored permit covers a push racing with `pop`
        self.notify.notify_one();
        outcome
    }

    fn insert(
        &self,
        entry: ConfigEntry<C>,
    ) -> Enqueued {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let len = state.pending.len();

        let outcome = match state.pending.entry(entry.id) {
            Entry::Occupied(mut pending) => {
                pending.insert(entry.config);
                Enqueued::Coalesced
            }
            Entry::Vacant(slot) => {
                state.order.push_back(slot.key().clone());
                slot.insert(entry.config);
                Enqueued::Queued
            }
        };

        if outcome == Enqueued::Queued && len >= self.warn_threshold && !state.over_threshold {
            state.over_threshold = true;
            warn!(
                warn_threshold = self.warn_threshold,
                "outbound queue holds more distinct ids than its warning threshold"
            );
        }

        outcome
    }

    pub fn try_pop(&self) -> Option<ConfigEntry<C>> {
        let mut state = self.state.lock();
        while let Some(id) = state.order.pop_front() {
            if let Some(config) = state.pending.remove(&id) {
                if state.pending.len() < self.warn_threshold {
                    state.over_threshold = false;
                }
                return Some(ConfigEntry::new(id, config));
            }
        }
        None
    }

    /// Wait for the next pending entry
    pub async fn pop(&self) -> ConfigEntry<C> {
        loop {
            if let Some(entry) = self.try_pop() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
