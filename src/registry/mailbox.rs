//! Bounded per-subscriber mailbox
//!
//! Many producers (concurrent `broadcast` calls) push through cloned
//! [`MailboxSender`]s; exactly one consumer, the subscriber's own stream
//! loop, drains the [`Mailbox`]. Pushing never waits: a full mailbox resolves
//! the conflict with its [`OverflowPolicy`] and returns immediately.
//!
//! Built on a bounded `tokio::sync::mpsc` channel. `DropNewest` is a plain
//! `try_send`. `DropOldest` additionally shares the receiver with the
//! senders so a producer that finds the channel full can pop the head
//! before retrying; `mpsc` has no sender-side eviction of its own.

use std::future::poll_fn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use super::config::OverflowPolicy;
use crate::sample::BroadcastSample;

/// Result of offering a sample to a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Queued behind any earlier samples
    Enqueued,
    /// Mailbox full; the offered sample was discarded
    Dropped,
    /// Mailbox full; the oldest queued sample was discarded and the offered one queued
    Evicted,
    /// The consumer is gone
    Closed,
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<BroadcastSample>>>;

fn lock(receiver: &SharedReceiver) -> MutexGuard<'_, mpsc::Receiver<BroadcastSample>> {
    // The lock guards a single channel call at a time, so a poisoned receiver is still usable
    receiver.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a mailbox holding at most `capacity` samples (at least 1)
pub fn mailbox(capacity: usize, policy: OverflowPolicy) -> (MailboxSender, Mailbox) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let receiver = Arc::new(Mutex::new(rx));

    let evict = match policy {
        OverflowPolicy::DropNewest => None,
        OverflowPolicy::DropOldest => Some(Arc::clone(&receiver)),
    };

    (
        MailboxSender { tx, evict },
        Mailbox { receiver, capacity },
    )
}

/// Producer handle, held by the registry
#[derive(Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<BroadcastSample>,
    /// Receiver handle used to evict the head under `DropOldest`
    evict: Option<SharedReceiver>,
}

impl MailboxSender {
    /// Offer a sample without waiting
    pub fn offer(&self, sample: BroadcastSample) -> Offer {
        match self.tx.try_send(sample) {
            Ok(()) => Offer::Enqueued,
            Err(TrySendError::Closed(_)) => Offer::Closed,
            Err(TrySendError::Full(sample)) => match &self.evict {
                None => Offer::Dropped,
                Some(receiver) => self.evict_and_send(receiver, sample),
            },
        }
    }

    fn evict_and_send(&self, receiver: &SharedReceiver, mut sample: BroadcastSample) -> Offer {
        // Holding the receiver keeps the consumer from racing the eviction
        let mut rx = lock(receiver);

        loop {
            if rx.try_recv().is_err() {
                // Nothing visible to evict yet; give up on this sample
                return Offer::Dropped;
            }

            match self.tx.try_send(sample) {
                Ok(()) => return Offer::Evicted,
                Err(TrySendError::Closed(_)) => return Offer::Closed,
                // Another producer took the freed slot
                Err(TrySendError::Full(rejected)) => sample = rejected,
            }
        }
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Samples currently queued
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer handle, owned by one subscription loop
pub struct Mailbox {
    receiver: SharedReceiver,
    capacity: usize,
}

impl Mailbox {
    /// Wait for the next sample in FIFO order
    ///
    /// Returns `None` once every sender is dropped and the queue is drained.
    /// Cancel safe: dropping the future never loses a queued sample.
    pub async fn recv(&mut self) -> Option<BroadcastSample> {
        poll_fn(|cx| lock(&self.receiver).poll_recv(cx)).await
    }

    /// Take the next sample if one is queued
    pub fn try_recv(&mut self) -> Option<BroadcastSample> {
        lock(&self.receiver).try_recv().ok()
    }

    pub fn len(&self) -> usize {
        lock(&self.receiver).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        // Under DropOldest the senders still hold the receiver, so close it explicitly
        let mut rx = lock(&self.receiver);
        rx.close();
        while rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::sample::MetricSample;

    fn sample(seq: u64) -> BroadcastSample {
        BroadcastSample::encode(&MetricSample::new("host", seq)).unwrap()
    }

    fn seq_of(sample: &BroadcastSample) -> u64 {
        sample.to_sample().unwrap().timestamp_ms
    }

    #[test]
    fn test_fifo_order() {
        let (tx, mut rx) = mailbox(4, OverflowPolicy::DropNewest);

        for seq in 1..=3 {
            assert_eq!(tx.offer(sample(seq)), Offer::Enqueued);
        }

        let drained: Vec<u64> = std::iter::from_fn(|| rx.try_recv()).map(|s| seq_of(&s)).collect();
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[test]
    fn test_drop_newest_keeps_queued() {
        let (tx, mut rx) = mailbox(2, OverflowPolicy::DropNewest);

        assert_eq!(tx.offer(sample(1)), Offer::Enqueued);
        assert_eq!(tx.offer(sample(2)), Offer::Enqueued);
        assert_eq!(tx.offer(sample(3)), Offer::Dropped);

        assert_eq!(seq_of(&rx.try_recv().unwrap()), 1);
        assert_eq!(seq_of(&rx.try_recv().unwrap()), 2);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let (tx, mut rx) = mailbox(2, OverflowPolicy::DropOldest);

        tx.offer(sample(1));
        tx.offer(sample(2));
        assert_eq!(tx.offer(sample(3)), Offer::Evicted);

        assert_eq!(seq_of(&rx.try_recv().unwrap()), 2);
        assert_eq!(seq_of(&rx.try_recv().unwrap()), 3);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let (tx, _rx) = mailbox(0, OverflowPolicy::DropNewest);

        assert_eq!(tx.capacity(), 1);
        assert_eq!(tx.offer(sample(1)), Offer::Enqueued);
        assert_eq!(tx.offer(sample(2)), Offer::Dropped);
    }

    #[test]
    fn test_offer_after_receiver_dropped() {
        let (tx, rx) = mailbox(2, OverflowPolicy::DropNewest);
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.offer(sample(1)), Offer::Closed);
        assert!(tx.is_empty());
    }

    #[test]
    fn test_drop_oldest_offer_after_receiver_dropped() {
        let (tx, rx) = mailbox(1, OverflowPolicy::DropOldest);
        tx.offer(sample(1));
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.offer(sample(2)), Offer::Closed);
        assert!(tx.is_empty());
    }

    #[test]
    fn test_len_tracks_queue() {
        let (tx, mut rx) = mailbox(3, OverflowPolicy::DropNewest);
        tx.offer(sample(1));
        tx.offer(sample(2));

        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);

        rx.try_recv();
        assert_eq!(tx.len(), 1);
        assert_eq!(rx.capacity(), 3);
    }

    #[test]
    fn test_recv_wakes_on_offer() {
        let (tx, mut rx) = mailbox(2, OverflowPolicy::DropNewest);
        let mut recv = task::spawn(rx.recv());

        assert_pending!(recv.poll());

        tx.offer(sample(7));
        assert!(recv.is_woken());

        let received = assert_ready!(recv.poll());
        assert_eq!(seq_of(&received.unwrap()), 7);
    }

    #[test]
    fn test_recv_ends_when_senders_dropped() {
        let (tx, mut rx) = mailbox(2, OverflowPolicy::DropNewest);
        let extra = tx.clone();
        tx.offer(sample(1));

        drop(tx);
        drop(extra);

        let mut recv = task::spawn(rx.recv());
        let first = assert_ready!(recv.poll());
        assert!(first.is_some());
        drop(recv);

        let mut recv = task::spawn(rx.recv());
        assert_eq!(assert_ready!(recv.poll()), None);
    }

    #[tokio::test]
    async fn test_concurrent_producers_respect_capacity() {
        let (tx, rx) = mailbox(50, OverflowPolicy::DropNewest);
        let mut handles = Vec::new();

        for worker in 0..8u64 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let mut enqueued = 0;
                for i in 0..20 {
                    if tx.offer(sample(worker * 100 + i)) == Offer::Enqueued {
                        enqueued += 1;
                    }
                }
                enqueued
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }

        assert_eq!(total, 50);
        assert_eq!(rx.len(), 50);
    }

    #[tokio::test]
    async fn test_concurrent_drop_oldest_stays_bounded() {
        let (tx, mut rx) = mailbox(4, OverflowPolicy::DropOldest);
        let mut handles = Vec::new();

        for worker in 0..4u64 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    assert_ne!(tx.offer(sample(worker * 100 + i)), Offer::Closed);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(rx.len() <= 4);
        let drained: Vec<u64> = std::iter::from_fn(|| rx.try_recv()).map(|s| seq_of(&s)).collect();
        assert!(!drained.is_empty());
        // Each worker's survivors are still in the order it offered them
        for worker in 0..4u64 {
            let own: Vec<u64> = drained
                .iter()
                .copied()
                .filter(|seq| seq / 100 == worker)
                .collect();
            assert!(own.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
