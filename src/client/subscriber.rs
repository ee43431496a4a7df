//! Subscriber-side client

use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::{ProtocolError, Result};
use crate::protocol::{Endpoint, Frame, FrameCodec};
use crate::sample::MetricSample;

/// Receives the relay's live feed over one SubscribeMetrics call
///
/// Samples broadcast before the subscription is registered, or while the
/// subscriber is disconnected, are never replayed.
pub struct SubscriberClient {
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

impl SubscriberClient {
    /// Connect and open a SubscribeMetrics stream
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;

        let (read_half, write_half) = socket.into_split();
        let mut writer = FramedWrite::new(write_half, FrameCodec::new());
        writer.send(Frame::call(Endpoint::SubscribeMetrics)).await?;

        Ok(Self {
            reader: FramedRead::new(read_half, FrameCodec::new()),
            writer,
        })
    }

    /// Wait for the next sample
    ///
    /// Returns `None` when the relay ends the stream.
    pub async fn next_sample(&mut self) -> Result<Option<MetricSample>> {
        match self.reader.next().await {
            Some(Ok(Frame::Sample(payload))) => {
                let sample = MetricSample::decode(payload).map_err(ProtocolError::from)?;
                Ok(Some(sample))
            }
            Some(Ok(Frame::Reject(reason))) => Err(ProtocolError::Rejected(reason).into()),
            Some(Ok(other)) => Err(ProtocolError::UnexpectedFrame(format!(
                "{} on SubscribeMetrics stream",
                other.name()
            ))
            .into()),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Hang up; the relay unregisters this subscriber
    pub async fn close(mut self) -> Result<()> {
        self.writer.close().await
    }
}
