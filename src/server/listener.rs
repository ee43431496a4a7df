//! Relay server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::Result;
use crate::observer::RelayObserver;
use crate::protocol::{Frame, FrameCodec};
use crate::registry::Broadcaster;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// Telemetry relay server
pub struct RelayServer {
    config: ServerConfig,
    broadcaster: Arc<Broadcaster>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Create a new server logging through `tracing`
    pub fn new(config: ServerConfig) -> Self {
        let broadcaster = Arc::new(Broadcaster::with_config(config.registry.clone()));
        Self::with_broadcaster(config, broadcaster)
    }

    /// Create a new server reporting relay events to `observer`
    pub fn with_observer(config: ServerConfig, observer: Arc<dyn RelayObserver>) -> Self {
        let broadcaster = Arc::new(Broadcaster::with_observer(
            config.registry.clone(),
            observer,
        ));
        Self::with_broadcaster(config, broadcaster)
    }

    /// Create a new server around an existing broadcaster
    pub fn with_broadcaster(config: ServerConfig, broadcaster: Arc<Broadcaster>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            broadcaster,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get a reference to the broadcaster
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown the accept loop stops and every open stream is told to
    /// finish, which unregisters all subscribers.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener) => {}
        }

        self.shutdown.cancel();
        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    tokio::spawn(reject(
                        socket,
                        "connection limit reached",
                        self.config.call_timeout,
                    ));
                    return;
                }
            }
        } else {
            None
        };

        // Generate session ID
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let connection = Connection::from_tcp(
            session_id,
            socket,
            self.config.clone(),
            Arc::clone(&self.broadcaster),
            self.shutdown.child_token(),
        );
        let span = tracing::info_span!("connection", session_id, peer = %peer_addr);

        tokio::spawn(
            async move {
                let _permit = permit;

                if let Err(e) = connection.run().await {
                    tracing::debug!(error = %e, "Connection error");
                }

                tracing::debug!("Connection closed");
            }
            .instrument(span),
        );
    }
}

/// Tell a client why it is being turned away, then close
async fn reject(socket: TcpStream, reason: &'static str, call_timeout: Duration) {
    let mut framed = Framed::new(socket, FrameCodec::new());

    // Read the Call first; closing with unread input would reset the connection
    let _ = tokio::time::timeout(call_timeout, framed.next()).await;

    if let Err(e) = framed.send(Frame::Reject(reason.to_string())).await {
        tracing::debug!(error = %e, "Failed to send reject");
    }
}
