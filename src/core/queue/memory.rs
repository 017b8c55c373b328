use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::core::capacity::Capacity;
use crate::core::error::{OfferError, QueueError};
use crate::core::queue::QueueBehavior;
use crate::core::waiter::{Pending, Requeue, WaiterList};
use crate::metrics::QueueMetrics;

/// In-memory FIFO queue with optional capacity and suspending dequeue.
#[derive(Debug)]
pub struct MemoryQueue<T> {
    name: String,
    capacity: Capacity,
    inner: Mutex<MemoryInner<T>>,
    metrics: Arc<QueueMetrics>,
}

#[derive(Debug)]
struct MemoryInner<T> {
    items: VecDeque<T>,
    waiters: WaiterList<T>,
    shutdown: bool,
}

impl<T> MemoryQueue<T> {
    pub fn new(name: impl Into<String>, capacity: Capacity) -> Self {
        Self {
            name: name.into(),
            capacity,
            inner: Mutex::new(MemoryInner {
                items: VecDeque::new(),
                waiters: WaiterList::new(),
                shutdown: false,
            }),
            metrics: Arc::new(QueueMetrics::new()),
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new("memory", Capacity::Bounded(capacity))
    }

    pub fn unbounded() -> Self {
        Self::new("memory", Capacity::Unbounded)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    /// Offer an item.
    ///
    /// A registered waiter receives the item directly, ahead of anything
    /// already stored. Otherwise the item is appended, unless the queue is
    /// at capacity.
    pub fn enqueue(&self, item: T) -> Result<(), OfferError<T>> {
        let mut inner = self.inner.lock();

        if inner.shutdown {
            self.metrics.inc_rejected_shutdown();
            return Err(OfferError::Shutdown(item));
        }

        let item = match inner.waiters.deliver(item) {
            Ok(()) => {
                self.metrics.inc_enqueued();
                self.metrics.inc_handed_off();
                trace!(queue = %self.name, "handed item to waiting consumer");
                return Ok(());
            }
            Err(item) => item,
        };

        if self.capacity.is_full(inner.items.len()) {
            self.metrics.inc_rejected_full();
            trace!(queue = %self.name, capacity = %self.capacity, "queue full, offer rejected");
            return Err(OfferError::Full(item));
        }

        inner.items.push_back(item);
        self.metrics.inc_enqueued();
        trace!(queue = %self.name, len = inner.items.len(), "item enqueued");
        Ok(())
    }

    /// Take the head item, suspending until one arrives.
    ///
    /// Resolves to `Ok(None)` once the queue is shut down and drained, and to
    /// `Err(QueueError::Shutdown)` if the queue shuts down while this call is
    /// waiting. Dropping the returned future withdraws the waiter without
    /// losing any item, including one handed over but not yet observed.
    pub async fn dequeue(&self) -> Result<Option<T>, QueueError> {
        let mut pending = {
            let mut inner = self.inner.lock();
            if let Some(item) = inner.items.pop_front() {
                self.metrics.inc_dequeued();
                return Ok(Some(item));
            }
            if inner.shutdown {
                return Ok(None);
            }
            let (_, rx) = inner.waiters.register();
            Pending::new(self, rx)
        };

        match pending.receiver().await {
            Ok(item) => {
                self.metrics.inc_dequeued();
                Ok(Some(item))
            }
            Err(_) => Err(QueueError::Shutdown),
        }
    }

    pub fn try_dequeue(&self) -> Option<T> {
        let item = self.inner.lock().items.pop_front();
        if item.is_some() {
            self.metrics.inc_dequeued();
        }
        item
    }

    /// Non-destructive read of the head item.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().items.front().cloned()
    }

    /// Clone of every stored item in FIFO order.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.lock().items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of consumers currently suspended in `dequeue`.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// Close the queue: reject further offers and every suspended consumer.
    /// Stored items stay available to `dequeue` until drained.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.shutdown = true;
        let rejected = inner.waiters.reject_all();
        debug!(
            queue = %self.name,
            rejected,
            remaining = inner.items.len(),
            "queue shut down"
        );
    }
}

impl<T> Requeue<T> for MemoryQueue<T> {
    /// The item was already accepted, so it bypasses the capacity check and
    /// goes back to the head.
    fn requeue(&self, item: T) {
        let mut inner = self.inner.lock();
        match inner.waiters.deliver(item) {
            Ok(()) => trace!(queue = %self.name, "returned item passed to next consumer"),
            Err(item) => {
                inner.items.push_front(item);
                trace!(queue = %self.name, "returned item restored at head");
            }
        }
    }
}

impl<T: Send> QueueBehavior<T> for MemoryQueue<T> {
    fn name(&self) -> &str {
        MemoryQueue::name(self)
    }

    fn capacity(&self) -> Capacity {
        MemoryQueue::capacity(self)
    }

    fn enqueue(&self, item: T) -> Result<(), OfferError<T>> {
        MemoryQueue::enqueue(self, item)
    }

    fn try_dequeue(&self) -> Option<T> {
        MemoryQueue::try_dequeue(self)
    }

    fn len(&self) -> usize {
        MemoryQueue::len(self)
    }

    fn is_shutdown(&self) -> bool {
        MemoryQueue::is_shutdown(self)
    }

    fn shutdown(&self) {
        MemoryQueue::shutdown(self)
    }
}
