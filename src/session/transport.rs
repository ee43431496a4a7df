//! Transport seams for the stream loops

use std::future::Future;

use crate::error::Result;
use crate::sample::BroadcastSample;

/// Inbound half of an agent stream
pub trait SampleSource: Send {
    /// Wait for the next sample
    ///
    /// `Ok(None)` means the agent ended the stream cleanly. Any error is a
    /// transport failure and ends the stream.
    fn next_sample(&mut self) -> impl Future<Output = Result<Option<BroadcastSample>>> + Send;

    /// Send the single end-of-stream acknowledgment
    fn acknowledge(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Outbound half of a subscriber stream
pub trait SampleSink: Send {
    /// Deliver one sample to the subscriber
    fn send_sample(&mut self, sample: &BroadcastSample) -> impl Future<Output = Result<()>> + Send;
}
