//! Error types for the relay
//!
//! Every failure here is local to one connection. Nothing in this module is
//! shared with the registry or with other streams.

use std::time::Duration;

use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer violated the framing protocol
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Registry rejected an operation
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid startup configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Peer closed the connection before the stream finished
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Relay began shutting down while the stream was open
    #[error("relay is shutting down")]
    Shutdown,

    /// A stream loop was asked to run again after it finished
    #[error("stream already finished")]
    StreamFinished,
}

impl Error {
    /// Whether this error came from the stream transport.
    ///
    /// Transport errors terminate only the loop that hit them.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Protocol(_) | Error::ConnectionClosed
        )
    }
}

/// Framing and message-level protocol errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("unknown endpoint 0x{0:02x}")]
    UnknownEndpoint(u8),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("failed to decode metric sample: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to encode metric sample: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error("call rejected by relay: {0}")]
    Rejected(String),

    #[error("no call received within {0:?}")]
    CallTimeout(Duration),
}
