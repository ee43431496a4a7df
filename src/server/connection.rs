//! Per-connection handling
//!
//! Reads the opening Call frame, then hands the connection to the matching
//! stream loop for the rest of its life.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::constants::PROTOCOL_VERSION;
use crate::protocol::{Endpoint, Frame, FrameCodec};
use crate::registry::Broadcaster;
use crate::sample::BroadcastSample;
use crate::server::config::ServerConfig;
use crate::session::{IngestionLoop, SampleSink, SampleSource, SubscriptionLoop};

/// Agent side of a SendMetrics stream
pub struct FramedSource<R, W> {
    reader: FramedRead<R, FrameCodec>,
    writer: FramedWrite<W, FrameCodec>,
}

impl<R, W> FramedSource<R, W> {
    pub fn new(reader: FramedRead<R, FrameCodec>, writer: FramedWrite<W, FrameCodec>) -> Self {
        Self { reader, writer }
    }
}

impl<R, W> SampleSource for FramedSource<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_sample(&mut self) -> Result<Option<BroadcastSample>> {
        match self.reader.next().await {
            Some(Ok(Frame::Sample(payload))) => BroadcastSample::decode(payload).map(Some),
            Some(Ok(Frame::EndOfStream)) => Ok(None),
            Some(Ok(other)) => Err(ProtocolError::UnexpectedFrame(format!(
                "{} on SendMetrics stream",
                other.name()
            ))
            .into()),
            Some(Err(e)) => Err(e),
            // Closing without EndOfStream is an aborted stream, not a clean one
            None => Err(Error::ConnectionClosed),
        }
    }

    async fn acknowledge(&mut self) -> Result<()> {
        self.writer.send(Frame::Ack).await
    }
}

/// Subscriber side of a SubscribeMetrics stream
pub struct FramedSink<W> {
    writer: FramedWrite<W, FrameCodec>,
}

impl<W> FramedSink<W> {
    pub fn new(writer: FramedWrite<W, FrameCodec>) -> Self {
        Self { writer }
    }
}

impl<W> SampleSink for FramedSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_sample(&mut self, sample: &BroadcastSample) -> Result<()> {
        self.writer
            .send(Frame::Sample(sample.payload().clone()))
            .await
    }
}

/// Cancel `cancel` once the subscriber hangs up
///
/// Subscribers send nothing after their Call, so the only thing expected on
/// the inbound half is EOF.
async fn watch_peer<R>(mut reader: FramedRead<R, FrameCodec>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    tracing::debug!(frame = frame.name(), "Ignoring frame on subscriber stream");
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Subscriber read failed");
                    cancel.cancel();
                    return;
                }
                None => {
                    cancel.cancel();
                    return;
                }
            }
        }
    }
}

/// A single client connection
pub struct Connection<R, W> {
    session_id: u64,
    reader: FramedRead<R, FrameCodec>,
    writer: FramedWrite<W, FrameCodec>,
    config: ServerConfig,
    broadcaster: Arc<Broadcaster>,
    shutdown: CancellationToken,
}

impl Connection<OwnedReadHalf, OwnedWriteHalf> {
    /// Wrap an accepted TCP socket
    pub fn from_tcp(
        session_id: u64,
        socket: TcpStream,
        config: ServerConfig,
        broadcaster: Arc<Broadcaster>,
        shutdown: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = socket.into_split();
        Self::new(session_id, read_half, write_half, config, broadcaster, shutdown)
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        session_id: u64,
        reader: R,
        writer: W,
        config: ServerConfig,
        broadcaster: Arc<Broadcaster>,
        shutdown: CancellationToken,
    ) -> Self {
        let codec = FrameCodec::with_max_frame_size(config.max_frame_size);

        Self {
            session_id,
            reader: FramedRead::new(reader, codec.clone()),
            writer: FramedWrite::new(writer, codec),
            config,
            broadcaster,
            shutdown,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Serve the connection until its stream ends
    pub async fn run(mut self) -> Result<()> {
        let Some(endpoint) = self.read_call().await? else {
            tracing::debug!(session_id = self.session_id, "Closed before Call");
            return Ok(());
        };

        tracing::debug!(session_id = self.session_id, endpoint = %endpoint, "Call accepted");

        let Connection {
            reader,
            writer,
            broadcaster,
            shutdown,
            ..
        } = self;

        match endpoint {
            Endpoint::SendMetrics => {
                let mut ingest = IngestionLoop::new(FramedSource::new(reader, writer), broadcaster);
                ingest.run_until(&shutdown).await.map(|_| ())
            }
            Endpoint::SubscribeMetrics => {
                let cancel = shutdown.child_token();
                let mut subscription =
                    SubscriptionLoop::new(FramedSink::new(writer), broadcaster, cancel.clone());

                let streaming = async {
                    let result = subscription.run().await;
                    // Stops the watcher when the loop ends on its own
                    cancel.cancel();
                    result
                };

                let (result, ()) = tokio::join!(streaming, watch_peer(reader, cancel.clone()));
                result
            }
        }
    }

    async fn read_call(&mut self) -> Result<Option<Endpoint>> {
        let timeout = self.config.call_timeout;
        let frame = match tokio::time::timeout(timeout, self.reader.next()).await {
            Ok(frame) => frame,
            Err(_) => return Err(ProtocolError::CallTimeout(timeout).into()),
        };

        match frame {
            None => Ok(None),
            Some(Err(e)) => Err(e),
            Some(Ok(Frame::Call { version, endpoint })) if version == PROTOCOL_VERSION => {
                Ok(Some(endpoint))
            }
            Some(Ok(Frame::Call { version, .. })) => {
                self.reject(format!("unsupported protocol version {version}"))
                    .await;
                Err(ProtocolError::UnsupportedVersion(version).into())
            }
            Some(Ok(other)) => {
                self.reject("expected Call frame".to_string()).await;
                Err(ProtocolError::UnexpectedFrame(format!("{} before Call", other.name())).into())
            }
        }
    }

    async fn reject(&mut self, reason: String) {
        if let Err(e) = self.writer.send(Frame::Reject(reason)).await {
            tracing::debug!(session_id = self.session_id, error = %e, "Failed to send reject");
        }
    }
}
