//! Lock-free broadcaster counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals, updated from any task without locking
#[derive(Debug, Default)]
pub struct BroadcastStats {
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
    registered: AtomicU64,
    unregistered: AtomicU64,
}

/// Point-in-time copy of [`BroadcastStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls to `broadcast`
    pub broadcasts: u64,
    /// Samples enqueued into a mailbox
    pub delivered: u64,
    /// Samples discarded because a mailbox was full
    pub dropped: u64,
    /// Queued samples evicted to admit a newer one
    pub evicted: u64,
    /// Subscribers ever registered
    pub registered: u64,
    /// Subscribers removed
    pub unregistered: u64,
}

impl BroadcastStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unregistered(&self) {
        self.unregistered.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current totals
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Subscribers currently registered according to the counters
    pub fn active_subscribers(&self) -> u64 {
        self.registered.saturating_sub(self.unregistered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        assert_eq!(BroadcastStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_snapshot_reflects_records() {
        let stats = BroadcastStats::new();
        stats.record_broadcast();
        stats.record_delivered();
        stats.record_delivered();
        stats.record_dropped();
        stats.record_registered();
        stats.record_registered();
        stats.record_unregistered();

        let snap = stats.snapshot();
        assert_eq!(snap.broadcasts, 1);
        assert_eq!(snap.delivered, 2);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.evicted, 0);
        assert_eq!(snap.active_subscribers(), 1);
    }
}
