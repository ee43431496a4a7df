//! Subscriber registry for fan-out
//!
//! The registry maps each live subscriber's token to the producer side of its
//! mailbox. Agent streams call [`Broadcaster::broadcast`]; each subscriber
//! stream drains its own [`Mailbox`].
//!
//! # Architecture
//!
//! ```text
//!                         Arc<Broadcaster>
//!                   ┌───────────────────────────┐
//!                   │ subscribers: RwLock<      │
//!                   │   HashMap<SubscriberId,   │
//!                   │           MailboxSender>> │
//!                   └─────────────┬─────────────┘
//!                                 │
//!        ┌────────────────────────┼────────────────────────┐
//!        │                        │                        │
//!        ▼                        ▼                        ▼
//!   [Agent stream]         [Subscriber stream]      [Subscriber stream]
//!   next_sample()          mailbox.recv()           mailbox.recv()
//!        │                        │                        │
//!        └──► broadcast() ──► offer() ──► send_sample() ──► TCP
//! ```
//!
//! # Backpressure by drop
//!
//! `broadcast` never waits on a subscriber. A full mailbox applies its
//! [`OverflowPolicy`] and the call moves on to the next subscriber, so a slow
//! consumer can only lose its own samples.

pub mod config;
pub mod error;
pub mod id;
pub mod mailbox;
pub mod store;

pub use config::{OverflowPolicy, RegistryConfig, DEFAULT_MAILBOX_CAPACITY};
pub use error::RegistryError;
pub use id::SubscriberId;
pub use mailbox::{mailbox, Mailbox, MailboxSender, Offer};
pub use store::{BroadcastOutcome, Broadcaster, Registration};
