//! blipq queue module.
//!
//! Defines the common queue abstraction and the three queue variants:
//! - `memory`: FIFO queue, bounded or unbounded, with blocking dequeue
//! - `delayed`: items become ready after a per-item delay, promoted by a
//!   periodic sweep
//! - `persistent`: FIFO queue with a write-back flush to a storage backend
//!
//! Every variant hands an item straight to the oldest waiting consumer when
//! one is registered, and otherwise stores it.

pub mod delayed;
pub mod memory;
pub mod persistent;

pub use delayed::DelayedQueue;
pub use memory::MemoryQueue;
pub use persistent::PersistentQueue;

use crate::core::capacity::Capacity;
use crate::core::error::OfferError;

/// Trait representing the synchronous surface shared by all queue variants.
///
/// The suspending `dequeue` lives on each type, since the delayed queue also
/// offers a timed variant.
///
/// All implementations must be thread-safe (`Send + Sync`).
pub trait QueueBehavior<T>: Send + Sync {
    /// The queue's identifier, used in logs and metrics.
    fn name(&self) -> &str;

    fn capacity(&self) -> Capacity;

    /// Offer an item. Never blocks; rejection hands the item back.
    fn enqueue(&self, item: T) -> Result<(), OfferError<T>>;

    /// Take the next available item without suspending.
    fn try_dequeue(&self) -> Option<T>;

    /// Return the current number of stored items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_shutdown(&self) -> bool;

    /// Close the queue. Idempotent.
    fn shutdown(&self);
}
