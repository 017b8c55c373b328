use std::fmt;

use thiserror::Error;

use crate::core::persistence::StorageType;

/// Why an offer was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Full,
    Shutdown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Full => write!(f, "full"),
            RejectReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// A rejected offer. The item is handed back to the producer untouched.
#[derive(PartialEq, Eq)]
pub enum OfferError<T> {
    /// Bounded capacity reached.
    Full(T),
    /// The queue has been shut down.
    Shutdown(T),
}

impl<T> OfferError<T> {
    pub fn reason(&self) -> RejectReason {
        match self {
            OfferError::Full(_) => RejectReason::Full,
            OfferError::Shutdown(_) => RejectReason::Shutdown,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, OfferError::Full(_))
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, OfferError::Shutdown(_))
    }

    /// Recover the item that was not accepted.
    pub fn into_inner(self) -> T {
        match self {
            OfferError::Full(item) | OfferError::Shutdown(item) => item,
        }
    }
}

// Manual impls so `T` does not need to be `Debug` to unwrap an offer result.
impl<T> fmt::Debug for OfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferError::Full(_) => f.write_str("Full(..)"),
            OfferError::Shutdown(_) => f.write_str("Shutdown(..)"),
        }
    }
}

impl<T> fmt::Display for OfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offer rejected: {}", self.reason())
    }
}

impl<T> std::error::Error for OfferError<T> {}

/// Failure observed by a suspended consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue was shut down while waiting for an item")]
    Shutdown,
}

/// Failure reported by a persistence backend. Never thrown to queue callers;
/// it is recorded in the persistence status instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("storage backend `{0}` is not available in this build")]
    Unsupported(StorageType),

    #[error("storage backend failure: {0}")]
    Backend(String),
}
