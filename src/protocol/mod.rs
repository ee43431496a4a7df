//! Relay wire protocol
//!
//! Each stream runs on its own TCP connection. The client opens with a
//! `Call` frame naming the endpoint, after which the connection carries
//! exactly one stream:
//!
//! ```text
//! SendMetrics (agent -> relay)
//!   Agent                                  Relay
//!     |------- Call(SendMetrics) ----------->|
//!     |------- Sample ---------------------->|  broadcast
//!     |------- Sample ---------------------->|  broadcast
//!     |------- EndOfStream ----------------->|
//!     |<------ Ack --------------------------|
//!
//! SubscribeMetrics (relay -> subscriber)
//!   Subscriber                             Relay
//!     |------- Call(SubscribeMetrics) ------>|  register
//!     |<------ Sample -----------------------|
//!     |<------ Sample -----------------------|
//!     |  (close)                             |  unregister
//! ```
//!
//! Every frame is a `u32` big-endian body length followed by the body. The
//! body starts with a one-byte frame type.

pub mod codec;
pub mod constants;
pub mod frame;

pub use codec::FrameCodec;
pub use frame::{Endpoint, Frame};
