//! Agent stream handling
//!
//! ```text
//!              next_sample() = Some
//!                ┌──────────┐
//!                ▼          │ broadcast
//!          ┌───────────┐────┘
//!          │ Receiving │
//!          └───────────┘
//!     None  │         │  Err
//!           ▼         ▼
//!      ┌────────┐  ┌────────┐
//!      │ Closed │  │ Failed │
//!      └────────┘  └────────┘
//!        ack sent    no ack
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observer::RelayEvent;
use crate::registry::Broadcaster;

use super::transport::SampleSource;

/// Ingestion lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    /// Waiting for the next sample
    Receiving,
    /// Agent ended the stream cleanly and was acknowledged
    Closed,
    /// Transport failed; no acknowledgment was sent
    Failed,
}

/// Drives one agent stream into the broadcaster
pub struct IngestionLoop<S> {
    source: S,
    broadcaster: Arc<Broadcaster>,
    phase: IngestPhase,
    samples: u64,
    started: bool,
}

impl<S: SampleSource> IngestionLoop<S> {
    pub fn new(source: S, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            source,
            broadcaster,
            phase: IngestPhase::Receiving,
            samples: 0,
            started: false,
        }
    }

    pub fn phase(&self) -> IngestPhase {
        self.phase
    }

    /// Samples received and broadcast so far
    pub fn samples_received(&self) -> u64 {
        self.samples
    }

    /// Receive until the agent closes the stream or the transport fails
    ///
    /// Each sample is broadcast as soon as it arrives. Returns the number of
    /// samples received on a clean close. No retry happens here; an agent
    /// whose stream fails reconnects as a new stream.
    pub async fn run(&mut self) -> Result<u64> {
        self.run_until(&CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but gives up once `cancel` fires
    ///
    /// An interrupted stream is not acknowledged and ends in `Failed` with
    /// [`Error::Shutdown`]. A loop runs at most once; later calls return
    /// [`Error::StreamFinished`].
    pub async fn run_until(&mut self, cancel: &CancellationToken) -> Result<u64> {
        if self.started {
            return Err(Error::StreamFinished);
        }
        self.started = true;

        let observer = Arc::clone(self.broadcaster.observer());
        observer.on_event(&RelayEvent::IngestStarted);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = self.source.next_sample() => Some(next),
            };

            match next {
                Some(Ok(Some(sample))) => {
                    self.samples += 1;
                    observer.on_event(&RelayEvent::SampleReceived {
                        host: sample.host(),
                        workloads: sample.workload_count(),
                    });
                    self.broadcaster.broadcast(&sample);
                }
                Some(Ok(None)) => {
                    self.phase = IngestPhase::Closed;
                    observer.on_event(&RelayEvent::IngestClosed {
                        samples: self.samples,
                    });

                    if let Err(error) = self.source.acknowledge().await {
                        self.phase = IngestPhase::Failed;
                        observer.on_event(&RelayEvent::IngestFailed {
                            samples: self.samples,
                            error: &error,
                        });
                        return Err(error);
                    }

                    return Ok(self.samples);
                }
                Some(Err(error)) => {
                    self.phase = IngestPhase::Failed;
                    observer.on_event(&RelayEvent::IngestFailed {
                        samples: self.samples,
                        error: &error,
                    });
                    return Err(error);
                }
                None => {
                    self.phase = IngestPhase::Failed;
                    observer.on_event(&RelayEvent::IngestInterrupted {
                        samples: self.samples,
                    });
                    return Err(Error::Shutdown);
                }
            }
        }
    }

    /// Give back the transport
    pub fn into_source(self) -> S {
        self.source
    }
}
