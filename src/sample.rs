//! Metric sample types
//!
//! [`MetricSample`] is the protobuf schema agents push. [`BroadcastSample`] is
//! the unit the broadcaster fans out: the payload exactly as it arrived, plus
//! the two fields the relay logs.
//!
//! # Zero-Copy Design
//!
//! The payload is held as `bytes::Bytes`, so every mailbox holding the same
//! sample shares one allocation. Cloning a `BroadcastSample` bumps a
//! reference count; the payload is never re-encoded on the way out.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::error::{ProtocolError, Result};

/// One snapshot pushed by an agent
#[derive(Clone, PartialEq, Message)]
pub struct MetricSample {
    /// Host the agent runs on
    #[prost(string, tag = "1")]
    pub host: String,

    /// Collection time, milliseconds since the Unix epoch
    #[prost(uint64, tag = "2")]
    pub timestamp_ms: u64,

    /// Per-workload measurements
    #[prost(message, repeated, tag = "3")]
    pub workloads: Vec<WorkloadMetrics>,
}

/// Measurements for a single workload on the host
#[derive(Clone, PartialEq, Message)]
pub struct WorkloadMetrics {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, tag = "2")]
    pub namespace: String,

    #[prost(double, tag = "3")]
    pub cpu_millicores: f64,

    #[prost(uint64, tag = "4")]
    pub memory_bytes: u64,
}

impl MetricSample {
    /// Create a sample with no workloads
    pub fn new(host: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            host: host.into(),
            timestamp_ms,
            workloads: Vec::new(),
        }
    }

    /// Append a workload measurement
    pub fn with_workload(mut self, workload: WorkloadMetrics) -> Self {
        self.workloads.push(workload);
        self
    }
}

impl WorkloadMetrics {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        cpu_millicores: f64,
        memory_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cpu_millicores,
            memory_bytes,
        }
    }
}

/// A sample ready to be fanned out to subscribers
///
/// Immutable once built. Cheap to clone.
#[derive(Clone, PartialEq)]
pub struct BroadcastSample {
    host: Arc<str>,
    workload_count: usize,
    payload: Bytes,
}

impl BroadcastSample {
    /// Validate a payload received from an agent
    ///
    /// The payload is decoded once to make sure it is a well-formed sample;
    /// the original bytes are what gets broadcast.
    pub fn decode(payload: Bytes) -> Result<Self> {
        let sample = MetricSample::decode(payload.clone()).map_err(ProtocolError::from)?;

        Ok(Self {
            host: Arc::from(sample.host.as_str()),
            workload_count: sample.workloads.len(),
            payload,
        })
    }

    /// Encode a sample for broadcasting
    pub fn encode(sample: &MetricSample) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(sample.encoded_len());
        sample.encode(&mut buf).map_err(ProtocolError::from)?;

        Ok(Self {
            host: Arc::from(sample.host.as_str()),
            workload_count: sample.workloads.len(),
            payload: buf.freeze(),
        })
    }

    /// Host identifier of the producing agent
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of workload records carried
    pub fn workload_count(&self) -> usize {
        self.workload_count
    }

    /// Encoded protobuf payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Decode the payload back into a [`MetricSample`]
    pub fn to_sample(&self) -> Result<MetricSample> {
        Ok(MetricSample::decode(self.payload.clone()).map_err(ProtocolError::from)?)
    }
}

impl fmt::Debug for BroadcastSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastSample")
            .field("host", &self.host)
            .field("workloads", &self.workload_count)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
