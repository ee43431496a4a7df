//! Relay server
//!
//! TCP accept loop plus per-connection dispatch onto the ingestion and
//! subscription loops.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{Connection, FramedSink, FramedSource};
pub use listener::RelayServer;
