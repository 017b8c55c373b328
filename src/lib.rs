//! blipq – in-process async queues.
//!
//! This crate exports
//!  * `core`    – capacity, errors, waiter list, persistence backends and the
//!                three queue variants (memory, delayed, persistent)
//!  * `config`  – TOML-driven queue configuration
//!  * `logging` – `tracing` subscriber setup
//!  * `metrics` – per-queue counters
//!
//! Queues are plain structs shared through `Arc`; producers `enqueue`,
//! consumers `dequeue().await`. The delayed and persistent variants own a
//! Tokio background task and must be created inside a runtime.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod util;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config, PersistenceConfig};
pub use crate::core::capacity::Capacity;
pub use crate::core::error::{OfferError, PersistError, QueueError, RejectReason};
pub use crate::core::persistence::{
    MemoryBackend, PersistedItem, PersistenceBackend, PersistenceStatus, StorageType,
};
pub use crate::core::queue::{DelayedQueue, MemoryQueue, PersistentQueue, QueueBehavior};
