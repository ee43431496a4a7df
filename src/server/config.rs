//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::DEFAULT_MAX_FRAME_SIZE;
use crate::registry::{OverflowPolicy, RegistryConfig};

/// Default relay listen port
pub const DEFAULT_PORT: u16 = 50051;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Largest frame body accepted or sent
    pub max_frame_size: usize,

    /// Time a client has to send its Call frame after connecting
    pub call_timeout: Duration,

    /// Subscriber registry settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,  // Samples are small and latency matters
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            call_timeout: Duration::from_secs(10),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set subscriber mailbox capacity
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.registry = self.registry.mailbox_capacity(capacity);
        self
    }

    /// Set mailbox overflow policy
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.registry = self.registry.overflow_policy(policy);
        self
    }
}
