//! Statistics for the broadcaster

pub mod counters;

pub use counters::{BroadcastStats, StatsSnapshot};
