//! Relay clients
//!
//! - [`AgentClient`] pushes samples on a SendMetrics stream
//! - [`SubscriberClient`] receives the live feed on a SubscribeMetrics stream

pub mod agent;
pub mod subscriber;

pub use agent::AgentClient;
pub use subscriber::SubscriberClient;
