//! Registry error types

use super::id::SubscriberId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Token already present; the existing entry was left untouched
    #[error("subscriber already registered: {0}")]
    DuplicateSubscriber(SubscriberId),
}
