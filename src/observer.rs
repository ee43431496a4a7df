//! Observability hooks for the relay core
//!
//! The broadcaster and both stream loops never log directly. They report
//! [`RelayEvent`]s to an injected [`RelayObserver`], which keeps the core free
//! of any particular logging setup and lets tests count events.
//!
//! ```text
//!   Broadcaster ─┐
//!   Ingestion  ──┼──► RelayObserver::on_event(&RelayEvent)
//!   Subscription ┘              │
//!                  ┌────────────┼─────────────┐
//!                  ▼            ▼             ▼
//!           TracingObserver  NoopObserver  custom (metrics, tests)
//! ```
//!
//! `on_event` is called inline from `broadcast`, so implementations must
//! return quickly and must not block.

use crate::error::Error;
use crate::registry::{OverflowPolicy, SubscriberId};

/// Something the relay core did
#[derive(Debug, Clone, Copy)]
pub enum RelayEvent<'a> {
    /// A subscriber entered the registry
    SubscriberRegistered {
        subscriber: SubscriberId,
        subscribers: usize,
    },
    /// A subscriber left the registry
    SubscriberUnregistered {
        subscriber: SubscriberId,
        subscribers: usize,
    },
    /// A sample was enqueued into a subscriber's mailbox
    SampleEnqueued { subscriber: SubscriberId },
    /// A subscriber's mailbox was full; one sample was lost for it
    SampleDropped {
        subscriber: SubscriberId,
        policy: OverflowPolicy,
    },
    /// An agent stream opened
    IngestStarted,
    /// A sample arrived from an agent
    SampleReceived { host: &'a str, workloads: usize },
    /// An agent closed its stream cleanly
    IngestClosed { samples: u64 },
    /// An agent stream failed
    IngestFailed { samples: u64, error: &'a Error },
    /// An agent stream was cut off by relay shutdown before it finished
    IngestInterrupted { samples: u64 },
    /// A sample was written to a subscriber
    SampleSent { subscriber: SubscriberId },
    /// A subscriber's connection was cancelled
    SubscriptionCancelled { subscriber: SubscriberId, sent: u64 },
    /// Writing to a subscriber failed
    SendFailed {
        subscriber: SubscriberId,
        error: &'a Error,
    },
}

/// Receives relay events
pub trait RelayObserver: Send + Sync {
    fn on_event(&self, event: &RelayEvent<'_>);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RelayObserver for TracingObserver {
    fn on_event(&self, event: &RelayEvent<'_>) {
        match *event {
            RelayEvent::SubscriberRegistered {
                subscriber,
                subscribers,
            } => {
                tracing::info!(subscriber = %subscriber, subscribers, "Subscriber registered");
            }
            RelayEvent::SubscriberUnregistered {
                subscriber,
                subscribers,
            } => {
                tracing::info!(subscriber = %subscriber, subscribers, "Subscriber unregistered");
            }
            RelayEvent::SampleEnqueued { subscriber } => {
                tracing::debug!(subscriber = %subscriber, "Sample enqueued");
            }
            RelayEvent::SampleDropped { subscriber, policy } => {
                tracing::warn!(
                    subscriber = %subscriber,
                    policy = ?policy,
                    "Dropping metrics: subscriber mailbox full"
                );
            }
            RelayEvent::IngestStarted => {
                tracing::info!("Started receiving metrics from agent");
            }
            RelayEvent::SampleReceived { host, workloads } => {
                tracing::info!(host, workloads, "Received metrics sample");
            }
            RelayEvent::IngestClosed { samples } => {
                tracing::info!(samples, "Agent stream closed, sending acknowledgment");
            }
            RelayEvent::IngestFailed { samples, error } => {
                tracing::error!(samples, error = %error, "Failed to receive metrics from agent");
            }
            RelayEvent::IngestInterrupted { samples } => {
                tracing::warn!(samples, "Agent stream interrupted by shutdown, no acknowledgment sent");
            }
            RelayEvent::SampleSent { subscriber } => {
                tracing::debug!(subscriber = %subscriber, "Sent metrics to subscriber");
            }
            RelayEvent::SubscriptionCancelled { subscriber, sent } => {
                tracing::info!(subscriber = %subscriber, sent, "Subscriber cancelled");
            }
            RelayEvent::SendFailed { subscriber, error } => {
                tracing::error!(
                    subscriber = %subscriber,
                    error = %error,
                    "Failed to send metrics to subscriber"
                );
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {
    fn on_event(&self, _event: &RelayEvent<'_>) {}
}
