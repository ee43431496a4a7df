//! Registry configuration

use std::fmt;
use std::str::FromStr;

/// Default number of samples a mailbox holds
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// What to do when a sample arrives at a full mailbox
///
/// Neither policy ever blocks the broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the incoming sample; queued samples are kept
    #[default]
    DropNewest,
    /// Evict the oldest queued sample to make room for the incoming one
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => f.write_str("drop-newest"),
            OverflowPolicy::DropOldest => f.write_str("drop-oldest"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-newest" => Ok(OverflowPolicy::DropNewest),
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!(
                "unknown overflow policy '{other}' (expected drop-newest or drop-oldest)"
            )),
        }
    }
}

/// Configuration for the subscriber registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Samples each subscriber mailbox can hold
    pub mailbox_capacity: usize,

    /// Behaviour when a mailbox is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            overflow_policy: OverflowPolicy::DropNewest,
        }
    }
}

impl RegistryConfig {
    /// Set mailbox capacity (at least 1)
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set overflow policy
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.mailbox_capacity, 100);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
    }

    #[test]
    fn test_builder_capacity_floor() {
        let config = RegistryConfig::default().mailbox_capacity(0);

        assert_eq!(config.mailbox_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .mailbox_capacity(8)
            .overflow_policy(OverflowPolicy::DropOldest);

        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("drop-newest".parse(), Ok(OverflowPolicy::DropNewest));
        assert_eq!("drop-oldest".parse(), Ok(OverflowPolicy::DropOldest));
        assert!("drop-random".parse::<OverflowPolicy>().is_err());

        assert_eq!(OverflowPolicy::DropOldest.to_string(), "drop-oldest");
    }
}
