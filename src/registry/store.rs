//! Subscriber registry and broadcaster
//!
//! The central registry mapping subscriber tokens to their mailboxes, and the
//! fan-out that pushes each sample into every mailbox.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::id::SubscriberId;
use super::mailbox::{self, Mailbox, MailboxSender, Offer};
use crate::observer::{RelayEvent, RelayObserver, TracingObserver};
use crate::sample::BroadcastSample;
use crate::stats::{BroadcastStats, StatsSnapshot};

/// What one `broadcast` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Mailboxes the sample was queued into
    pub delivered: usize,
    /// Mailboxes that were full and discarded the sample
    pub dropped: usize,
    /// Mailboxes that evicted an older sample to take this one
    pub evicted: usize,
}

/// Central registry of live subscribers
///
/// Thread-safe via `RwLock`. Broadcasts take the read side and may overlap
/// freely; register and unregister take the write side. No lock is ever held
/// across an await point, so every method here is synchronous and quick.
pub struct Broadcaster {
    /// Map of subscriber token to its mailbox producer
    subscribers: RwLock<HashMap<SubscriberId, MailboxSender>>,

    config: RegistryConfig,

    observer: Arc<dyn RelayObserver>,

    stats: BroadcastStats,
}

impl Broadcaster {
    /// Create a broadcaster with default configuration, logging through `tracing`
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a broadcaster with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Create a broadcaster reporting to the given observer
    pub fn with_observer(config: RegistryConfig, observer: Arc<dyn RelayObserver>) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            config,
            observer,
            stats: BroadcastStats::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Observer shared with the stream loops
    pub fn observer(&self) -> &Arc<dyn RelayObserver> {
        &self.observer
    }

    /// Create a mailbox sized and configured for this registry
    pub fn mailbox(&self) -> (MailboxSender, Mailbox) {
        mailbox::mailbox(self.config.mailbox_capacity, self.config.overflow_policy)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriberId, MailboxSender>> {
        // Every write is a single insert or remove, so a poisoned map is still consistent
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriberId, MailboxSender>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber
    ///
    /// Fails without touching the registry if the token is already present.
    pub fn register(&self, id: SubscriberId, sender: MailboxSender) -> Result<(), RegistryError> {
        let subscribers = {
            let mut subscribers = self.write();
            if subscribers.contains_key(&id) {
                return Err(RegistryError::DuplicateSubscriber(id));
            }
            subscribers.insert(id, sender);
            subscribers.len()
        };

        self.stats.record_registered();
        self.observer.on_event(&RelayEvent::SubscriberRegistered {
            subscriber: id,
            subscribers,
        });

        Ok(())
    }

    /// Remove a subscriber
    ///
    /// Returns whether an entry was removed. Unknown or already removed
    /// tokens are a no-op.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, subscribers) = {
            let mut subscribers = self.write();
            let removed = subscribers.remove(&id);
            (removed, subscribers.len())
        };

        // Drop the sender outside the lock
        if removed.is_none() {
            return false;
        }
        drop(removed);

        self.stats.record_unregistered();
        self.observer.on_event(&RelayEvent::SubscriberUnregistered {
            subscriber: id,
            subscribers,
        });

        true
    }

    /// Offer a sample to every registered subscriber
    ///
    /// Never waits. A full mailbox loses the sample for that subscriber only
    /// (or its oldest sample, under `DropOldest`); everyone else still gets it.
    pub fn broadcast(&self, sample: &BroadcastSample) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        self.stats.record_broadcast();

        let subscribers = self.read();

        for (id, sender) in subscribers.iter() {
            match sender.offer(sample.clone()) {
                Offer::Enqueued => {
                    outcome.delivered += 1;
                    self.stats.record_delivered();
                    self.observer
                        .on_event(&RelayEvent::SampleEnqueued { subscriber: *id });
                }
                Offer::Evicted => {
                    outcome.delivered += 1;
                    outcome.evicted += 1;
                    self.stats.record_delivered();
                    self.stats.record_evicted();
                    self.observer.on_event(&RelayEvent::SampleDropped {
                        subscriber: *id,
                        policy: self.config.overflow_policy,
                    });
                }
                Offer::Dropped => {
                    outcome.dropped += 1;
                    self.stats.record_dropped();
                    self.observer.on_event(&RelayEvent::SampleDropped {
                        subscriber: *id,
                        policy: self.config.overflow_policy,
                    });
                }
                // Consumer is mid-teardown; its registration guard removes the entry
                Offer::Closed => {}
            }
        }

        outcome
    }

    /// Register a fresh subscriber
    ///
    /// Returns a guard that unregisters on drop, plus the mailbox to drain.
    pub fn subscribe(self: &Arc<Self>) -> Result<(Registration, Mailbox), RegistryError> {
        let id = SubscriberId::generate();
        let (sender, mailbox) = self.mailbox();

        self.register(id, sender)?;

        let registration = Registration {
            id,
            broadcaster: Arc::clone(self),
        };

        Ok((registration, mailbox))
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Whether the token is currently registered
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.read().contains_key(&id)
    }

    /// Currently registered tokens
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.read().keys().copied().collect()
    }

    /// Copy of the running counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Live registry entry
///
/// Dropping the guard unregisters the subscriber, so the entry goes away on
/// every exit path, task abort included.
pub struct Registration {
    id: SubscriberId,
    broadcaster: Arc<Broadcaster>,
}

impl Registration {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.broadcaster.unregister(self.id);
    }
}
