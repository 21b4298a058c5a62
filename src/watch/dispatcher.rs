use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use autometrics::autometrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::Enqueued;
use super::OutboundQueue;
use crate::metrics::ACTIVE_SUBSCRIBERS;
use crate::metrics::CONFIG_UPDATES;
use crate::metrics::MESSAGES_COALESCED;
use crate::metrics::MESSAGES_ENQUEUED;
use crate::metrics::STORE_SIZE;
use crate::ConfigEntry;
use crate::ConfigFilter;
use crate::ConfigId;
use crate::ConfigObject;
use crate::ConfigStore;
use crate::Delta;
use crate::Result;

/// Internal subscriber state
#[derive(Debug)]
struct Subscriber<C> {
    filter: ConfigFilter,
    queue: Arc<OutboundQueue<C>>,
}

/// Bridges store mutation to per-subscriber delivery
///
/// The dispatcher exclusively owns the [`ConfigStore`] and the subscriber
/// registry. Bulk updates and registrations are serialized by one critical
/// section, so a new subscriber either sees an update in its initial snapshot
/// or receives it as a notification, never both and never neither.
#[derive(Debug)]
pub struct Dispatcher<C> {
    store: ConfigStore<C>,

    /// Subscribers keyed by id (lock-free concurrent HashMap)
    subscribers: DashMap<u64, Subscriber<C>>,

    /// Next subscriber id (monotonically increasing)
    next_id: AtomicU64,

    /// Serializes `update_config` and `register`
    write_lock: Mutex<()>,

    queue_warn_threshold: usize,
}

impl<C: ConfigObject> Dispatcher<C> {
    pub fn new(queue_warn_threshold: usize) -> Self {
        Self {
            store: ConfigStore::new(),
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            write_lock: Mutex::new(()),
            queue_warn_threshold,
        }
    }

    /// Register a subscriber and seed its queue with the matching snapshot.
    ///
    /// The subscriber is unregistered when the returned handle is dropped.
    pub fn register(
        self: &Arc<Self>,
        filter: ConfigFilter,
    ) -> Subscription<C> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(OutboundQueue::new(self.queue_warn_threshold));

        {
            let _guard = self.write_lock.lock();
            for entry in self.store.snapshot_filtered(&filter) {
                queue.push(entry);
            }
            self.subscribers.insert(
                id,
                Subscriber {
                    filter: filter.clone(),
                    queue: queue.clone(),
                },
            );
        }

        ACTIVE_SUBSCRIBERS.inc();
        trace!(
            subscriber_id = id,
            %filter,
            initial = queue.len(),
            "Subscriber registered"
        );

        Subscription {
            id,
            filter,
            queue,
            dispatcher: self.clone(),
        }
    }

    /// Remove a subscriber; returns false if it was already gone
    fn unregister(
        &self,
        id: u64,
    ) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            ACTIVE_SUBSCRIBERS.dec();
            trace!(subscriber_id = id, "Subscriber unregistered");
        }
        removed
    }

    /// Replace the store contents and push changed entries to matching subscribers.
    ///
    /// Removed ids produce no notification.
    #[autometrics]
    pub fn update_config(
        &self,
        entries: Vec<ConfigEntry<C>>,
    ) -> Result<Delta<C>> {
        let _guard = self.write_lock.lock();

        let delta = match self.store.update_config(entries) {
            Ok(delta) => delta,
            Err(e) => {
                CONFIG_UPDATES.with_label_values(&["rejected"]).inc();
                return Err(e);
            }
        };
        CONFIG_UPDATES.with_label_values(&["applied"]).inc();
        STORE_SIZE.add(delta.added.len() as i64 - delta.removed.len() as i64);

        let mut delivered = 0usize;
        for entry in delta.changed() {
            for subscriber in self.subscribers.iter() {
                if !subscriber.filter.matches(&entry.id) {
                    continue;
                }
                match subscriber.queue.push(entry.clone()) {
                    Enqueued::Queued => MESSAGES_ENQUEUED.inc(),
                    Enqueued::Coalesced => MESSAGES_COALESCED.inc(),
                }
                delivered += 1;
            }
        }

        if !delta.removed.is_empty() {
            debug!(removed = ?delta.removed, "configs removed; subscribers are not notified");
        }
        debug!(
            changed = delta.added.len() + delta.updated.len(),
            delivered,
            subscribers = self.subscribers.len(),
            "Config update dispatched"
        );

        Ok(delta)
    }

    pub fn get(
        &self,
        id: &ConfigId,
    ) -> Option<C> {
        self.store.get(id)
    }

    pub fn snapshot(&self) -> Vec<ConfigEntry<C>> {
        self.store.snapshot()
    }

    pub fn snapshot_filtered(
        &self,
        filter: &ConfigFilter,
    ) -> Vec<ConfigEntry<C>> {
        self.store.snapshot_filtered(filter)
    }

    /// Number of registered subscribers
    ///
    /// This is primarily for testing and monitoring purposes.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<C> Drop for Dispatcher<C> {
    fn drop(&mut self) {
        STORE_SIZE.sub(self.store.len() as i64);
    }
}

/// Handle for a registered subscriber
///
/// When dropped, the subscriber is automatically unregistered from the
/// [`Dispatcher`], exactly once.
#[derive(Debug)]
pub struct Subscription<C: ConfigObject> {
    id: u64,
    filter: ConfigFilter,
    queue: Arc<OutboundQueue<C>>,
    dispatcher: Arc<Dispatcher<C>>,
}

impl<C: ConfigObject> Subscription<C> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filter(&self) -> &ConfigFilter {
        &self.filter
    }

    /// Wait for the next entry destined to this subscriber
    pub async fn next(&self) -> ConfigEntry<C> {
        self.queue.pop().await
    }

    pub fn try_next(&self) -> Option<ConfigEntry<C>> {
        self.queue.try_pop()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl<C: ConfigObject> Drop for Subscription<C> {
    fn drop(&mut self) {
        self.dispatcher.unregister(self.id);
    }
}
