//! Per-connection stream state machines
//!
//! One [`IngestionLoop`] runs per connected agent and one
//! [`SubscriptionLoop`] per connected subscriber. Both talk to the network
//! only through the [`SampleSource`] / [`SampleSink`] seams, so they can be
//! driven by scripted transports in tests.

pub mod ingest;
pub mod subscribe;
pub mod transport;

pub use ingest::{IngestPhase, IngestionLoop};
pub use subscribe::{SubscriptionLoop, SubscriptionPhase};
pub use transport::{SampleSink, SampleSource};
