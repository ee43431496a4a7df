//! Telemetry relay
//!
//! Agents push streams of metric samples to one relay process, which
//! re-broadcasts every sample to all live subscribers in near real time.
//!
//! ```text
//!   Agent ──► IngestionLoop ──► Broadcaster::broadcast
//!                                     │
//!                     ┌───────────────┼───────────────┐
//!                     ▼               ▼               ▼
//!                  Mailbox         Mailbox         Mailbox
//!                     │               │               │
//!              SubscriptionLoop SubscriptionLoop SubscriptionLoop
//!                     │               │               │
//!                     ▼               ▼               ▼
//!                Subscriber      Subscriber      Subscriber
//! ```
//!
//! Delivery is best effort. A subscriber whose mailbox is full loses samples
//! rather than slowing the agents or the other subscribers.
//!
//! # Example
//! ```no_run
//! use telemetry_relay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> telemetry_relay::Result<()> {
//! let server = RelayServer::new(ServerConfig::default());
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod registry;
pub mod sample;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use observer::{NoopObserver, RelayEvent, RelayObserver, TracingObserver};
pub use registry::{Broadcaster, OverflowPolicy, RegistryConfig, SubscriberId};
pub use sample::{BroadcastSample, MetricSample, WorkloadMetrics};
pub use server::{RelayServer, ServerConfig};
