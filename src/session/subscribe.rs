//! Subscriber stream handling
//!
//! ```text
//!   ┌─────────────┐  register   ┌───────────┐   cancelled / send failed
//!   │ Registering │───────────►│ Streaming │─────────────────────────┐
//!   └─────────────┘             └───────────┘                         ▼
//!                                 ▲       │ sample            ┌──────────────┐
//!                                 └───────┘ sent               │ Unregistered │
//!                                                              └──────────────┘
//! ```
//!
//! The registry entry is owned by a [`Registration`] guard, so leaving
//! `Streaming` by any path (including the task being aborted) unregisters
//! exactly once.
//!
//! [`Registration`]: crate::registry::Registration

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observer::RelayEvent;
use crate::registry::{Broadcaster, SubscriberId};

use super::transport::SampleSink;

/// Subscription lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// Allocating token and mailbox
    Registering,
    /// Draining the mailbox to the subscriber
    Streaming,
    /// Removed from the registry; terminal
    Unregistered,
}

/// Drives one subscriber stream from its mailbox
pub struct SubscriptionLoop<K> {
    sink: K,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
    phase: SubscriptionPhase,
    subscriber: Option<SubscriberId>,
    sent: u64,
}

impl<K: SampleSink> SubscriptionLoop<K> {
    /// `cancel` fires when the subscriber disconnects or the relay shuts down
    pub fn new(sink: K, broadcaster: Arc<Broadcaster>, cancel: CancellationToken) -> Self {
        Self {
            sink,
            broadcaster,
            cancel,
            phase: SubscriptionPhase::Registering,
            subscriber: None,
            sent: 0,
        }
    }

    pub fn phase(&self) -> SubscriptionPhase {
        self.phase
    }

    /// Token assigned at registration
    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.subscriber
    }

    /// Samples written to the subscriber so far
    pub fn samples_sent(&self) -> u64 {
        self.sent
    }

    /// Register, then stream until cancelled or the sink fails
    ///
    /// Cancellation is a normal end and returns `Ok`. A failed send returns
    /// the transport error. The subscriber is unregistered before either
    /// returns. `Unregistered` is terminal: once the loop has left
    /// `Registering`, later calls return [`Error::StreamFinished`].
    pub async fn run(&mut self) -> Result<()> {
        if self.phase != SubscriptionPhase::Registering || self.subscriber.is_some() {
            return Err(Error::StreamFinished);
        }

        let (registration, mut mailbox) = self.broadcaster.subscribe()?;
        let id = registration.id();
        self.subscriber = Some(id);
        self.phase = SubscriptionPhase::Streaming;

        let observer = Arc::clone(self.broadcaster.observer());
        let cancel = self.cancel.clone();

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                sample = mailbox.recv() => sample,
            };

            // Mailbox closed underneath us: the entry was removed externally
            let Some(sample) = next else {
                observer.on_event(&RelayEvent::SubscriptionCancelled {
                    subscriber: id,
                    sent: self.sent,
                });
                break Ok(());
            };

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                sent = self.sink.send_sample(&sample) => Some(sent),
            };

            match sent {
                Some(Ok(())) => {
                    self.sent += 1;
                    observer.on_event(&RelayEvent::SampleSent { subscriber: id });
                }
                Some(Err(error)) => {
                    observer.on_event(&RelayEvent::SendFailed {
                        subscriber: id,
                        error: &error,
                    });
                    break Err(error);
                }
                None => {
                    observer.on_event(&RelayEvent::SubscriptionCancelled {
                        subscriber: id,
                        sent: self.sent,
                    });
                    break Ok(());
                }
            }
        };

        self.phase = SubscriptionPhase::Unregistered;
        drop(mailbox);
        drop(registration);

        result
    }

    /// Give back the transport
    pub fn into_sink(self) -> K {
        self.sink
    }
}
