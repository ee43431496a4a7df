//! Agent-side client
//!
//! High-level API for pushing metric samples to a relay.

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{Endpoint, Frame, FrameCodec};
use crate::sample::{BroadcastSample, MetricSample};

/// Streams samples to a relay over one SendMetrics call
///
/// # Example
/// ```no_run
/// use telemetry_relay::client::AgentClient;
/// use telemetry_relay::sample::MetricSample;
///
/// # async fn example() -> telemetry_relay::Result<()> {
/// let mut agent = AgentClient::connect("localhost:50051").await?;
///
/// agent.send(&MetricSample::new("node-a", 1_700_000_000_000)).await?;
///
/// // Ends the stream and waits for the relay's acknowledgment
/// agent.finish().await?;
/// # Ok(())
/// # }
/// ```
pub struct AgentClient {
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    sent: u64,
}

impl AgentClient {
    /// Connect and open a SendMetrics stream
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;

        let (read_half, write_half) = socket.into_split();
        let mut writer = FramedWrite::new(write_half, FrameCodec::new());
        writer.send(Frame::call(Endpoint::SendMetrics)).await?;

        Ok(Self {
            reader: FramedRead::new(read_half, FrameCodec::new()),
            writer,
            sent: 0,
        })
    }

    /// Send one sample
    pub async fn send(&mut self, sample: &MetricSample) -> Result<()> {
        let encoded = BroadcastSample::encode(sample)?;
        self.writer
            .send(Frame::Sample(encoded.payload().clone()))
            .await?;
        self.sent += 1;
        Ok(())
    }

    /// Samples sent so far
    pub fn samples_sent(&self) -> u64 {
        self.sent
    }

    /// End the stream and wait for the relay's acknowledgment
    pub async fn finish(mut self) -> Result<()> {
        self.writer.send(Frame::EndOfStream).await?;

        match self.reader.next().await {
            Some(Ok(Frame::Ack)) => Ok(()),
            Some(Ok(Frame::Reject(reason))) => Err(ProtocolError::Rejected(reason).into()),
            Some(Ok(other)) => Err(ProtocolError::UnexpectedFrame(format!(
                "{} instead of Ack",
                other.name()
            ))
            .into()),
            Some(Err(e)) => Err(e),
            None => Err(Error::ConnectionClosed),
        }
    }
}
