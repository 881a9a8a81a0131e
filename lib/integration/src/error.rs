//! Error types for the integration crate.
//!
//! - `StoreError`: failures from document store operations
//! - `NotifyError`: failures delivering a notification

use std::fmt;

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached.
    Unavailable { reason: String },
    /// A query or write was rejected by the store.
    OperationFailed {
        collection: String,
        operation: &'static str,
        reason: String,
    },
    /// A stored document could not be decoded.
    InvalidDocument { collection: String, key: String },
}

impl StoreError {
    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "document store unavailable: {reason}"),
            Self::OperationFailed {
                collection,
                operation,
                reason,
            } => write!(f, "{operation} on '{collection}' failed: {reason}"),
            Self::InvalidDocument { collection, key } => {
                write!(f, "invalid document '{key}' in '{collection}'")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from notification delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Delivery channel is temporarily unavailable.
    Unavailable { reason: String },
    /// The notification was rejected.
    Rejected { reason: String },
}

impl NotifyError {
    /// Returns true if retrying delivery may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "notification channel unavailable: {reason}"),
            Self::Rejected { reason } => write!(f, "notification rejected: {reason}"),
        }
    }
}

impl std::error::Error for NotifyError {}
