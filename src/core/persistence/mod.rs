//! Persistence backends for [`PersistentQueue`](crate::core::queue::PersistentQueue).
//!
//! A backend receives a full snapshot of the queue on every flush and hands
//! back the last stored snapshot on recovery. Failures are returned as
//! [`PersistError`] and recorded by the queue, never raised to producers or
//! consumers.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::core::error::PersistError;
use crate::util::current_timestamp;

/// Backend selector from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    File,
    #[serde(alias = "db")]
    Database,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Memory => write!(f, "memory"),
            StorageType::File => write!(f, "file"),
            StorageType::Database => write!(f, "database"),
        }
    }
}

/// A queued value with its persistence metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedItem<T> {
    pub value: T,
    /// Milliseconds since the Unix epoch.
    pub enqueued_at: u64,
    pub retry_count: u32,
}

impl<T> PersistedItem<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            enqueued_at: current_timestamp(),
            retry_count: 0,
        }
    }
}

/// Point-in-time view of the write-back state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceStatus {
    /// `true` once the last flush has caught up with every mutation.
    pub is_persisted: bool,
    /// Message of the most recent failed flush or recovery, cleared by the
    /// next successful flush.
    pub last_error: Option<String>,
    /// Mutations (accepted enqueues and dequeues) not yet flushed.
    pub pending_writes: u64,
    /// Watermark of the last successful flush, in ms since the Unix epoch.
    pub last_persisted_at: Option<u64>,
}

/// Storage seam for persistent queues.
pub trait PersistenceBackend<T>: Send + Sync {
    fn kind(&self) -> StorageType;

    /// Replace the stored state with `items`.
    fn store(&self, items: &[PersistedItem<T>]) -> Result<(), PersistError>;

    /// Return the last stored state, oldest item first.
    fn load(&self) -> Result<Vec<PersistedItem<T>>, PersistError>;
}

/// Keeps the last snapshot in process memory.
///
/// Clones share the same snapshot, so a queue built on a clone of another
/// queue's backend recovers what the first one flushed. Nothing survives the
/// process.
#[derive(Debug)]
pub struct MemoryBackend<T> {
    snapshot: Arc<Mutex<Vec<PersistedItem<T>>>>,
}

impl<T> MemoryBackend<T> {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of items in the stored snapshot.
    pub fn stored_len(&self) -> usize {
        self.snapshot.lock().len()
    }
}

impl<T> Clone for MemoryBackend<T> {
    fn clone(&self) -> Self {
        Self {
            snapshot: Arc::clone(&self.snapshot),
        }
    }
}

impl<T> Default for MemoryBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> PersistenceBackend<T> for MemoryBackend<T> {
    fn kind(&self) -> StorageType {
        StorageType::Memory
    }

    fn store(&self, items: &[PersistedItem<T>]) -> Result<(), PersistError> {
        let mut snapshot = self.snapshot.lock();
        snapshot.clear();
        snapshot.extend_from_slice(items);
        Ok(())
    }

    fn load(&self) -> Result<Vec<PersistedItem<T>>, PersistError> {
        Ok(self.snapshot.lock().clone())
    }
}

/// Stand-in for storage types this crate does not implement. Every call
/// fails, so the queue keeps reporting the gap through its status.
#[derive(Debug, Clone)]
pub struct UnsupportedBackend {
    kind: StorageType,
    location: Option<String>,
}

impl UnsupportedBackend {
    pub fn new(kind: StorageType, location: Option<String>) -> Self {
        Self { kind, location }
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

impl<T> PersistenceBackend<T> for UnsupportedBackend {
    fn kind(&self) -> StorageType {
        self.kind
    }

    fn store(&self, _items: &[PersistedItem<T>]) -> Result<(), PersistError> {
        Err(PersistError::Unsupported(self.kind))
    }

    fn load(&self) -> Result<Vec<PersistedItem<T>>, PersistError> {
        Err(PersistError::Unsupported(self.kind))
    }
}
