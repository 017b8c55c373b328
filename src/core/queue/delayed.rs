//! Delayed queue.
//!
//! Items carry an `execute_at` deadline and are kept sorted by it (stable:
//! equal deadlines keep insertion order). An item is *ready* once
//! `execute_at <= now`. Ready items reach consumers in two ways:
//! - `dequeue` takes the earliest ready item directly, or
//! - a suspended consumer is fulfilled by [`promote_ready`], which runs on
//!   every enqueue and on a fixed 100 ms sweep tick.
//!
//! The sweep is one task per queue instead of one timer per item, so
//! promotion latency is bounded by the tick.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::core::capacity::Capacity;
use crate::core::error::{OfferError, QueueError};
use crate::core::queue::QueueBehavior;
use crate::core::waiter::{Pending, Requeue, WaiterId, WaiterList};
use crate::metrics::QueueMetrics;

/// Interval of the readiness sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Longer delays are clamped to this (about 30 years), which keeps
/// `execute_at` representable.
pub const MAX_DELAY: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A value waiting for its deadline.
#[derive(Debug, Clone)]
pub struct DelayedItem<T> {
    pub value: T,
    pub delay: Duration,
    pub enqueued_at: Instant,
    pub execute_at: Instant,
}

impl<T> DelayedItem<T> {
    fn is_ready(&self, now: Instant) -> bool {
        self.execute_at <= now
    }
}

#[derive(Debug)]
struct DelayedInner<T> {
    items: VecDeque<DelayedItem<T>>,
    waiters: WaiterList<T>,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared<T> {
    name: String,
    capacity: Capacity,
    inner: Mutex<DelayedInner<T>>,
    metrics: Arc<QueueMetrics>,
}

/// Queue whose items become available after a per-item delay.
///
/// Must be created inside a Tokio runtime: construction spawns the sweep
/// task, which stops on [`shutdown`](DelayedQueue::shutdown) or when the
/// queue is dropped.
#[derive(Debug)]
pub struct DelayedQueue<T> {
    shared: Arc<Shared<T>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> DelayedQueue<T> {
    pub fn new(name: impl Into<String>, capacity: Capacity) -> Self {
        let shared = Arc::new(Shared {
            name: name.into(),
            capacity,
            inner: Mutex::new(DelayedInner {
                items: VecDeque::new(),
                waiters: WaiterList::new(),
                shutdown: false,
            }),
            metrics: Arc::new(QueueMetrics::new()),
        });

        let sweeper = tokio::spawn(sweep_loop(Arc::downgrade(&shared)));

        Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new("delayed", Capacity::Bounded(capacity))
    }

    pub fn unbounded() -> Self {
        Self::new("delayed", Capacity::Unbounded)
    }
}

impl<T> DelayedQueue<T> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> Capacity {
        self.shared.capacity
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.shared.metrics
    }

    /// Offer an item that is ready immediately.
    pub fn enqueue(&self, item: T) -> Result<(), OfferError<T>> {
        self.enqueue_delayed(item, Duration::ZERO)
    }

    /// Offer an item that becomes ready after `delay`, clamped to
    /// [`MAX_DELAY`].
    pub fn enqueue_delayed(&self, item: T, delay: Duration) -> Result<(), OfferError<T>> {
        let shared = &*self.shared;
        let delay = delay.min(MAX_DELAY);
        let now = Instant::now();
        let execute_at = now + delay;

        let mut inner = shared.inner.lock();
        if inner.shutdown {
            shared.metrics.inc_rejected_shutdown();
            return Err(OfferError::Shutdown(item));
        }

        // A full queue still accepts a ready item that a waiter will take
        // right away; the capacity check below undoes the insert otherwise.
        let handoff_possible = execute_at <= now && inner.waiters.has_live();
        if shared.capacity.is_full(inner.items.len()) && !handoff_possible {
            shared.metrics.inc_rejected_full();
            trace!(queue = %shared.name, capacity = %shared.capacity, "queue full, offer rejected");
            return Err(OfferError::Full(item));
        }

        let idx = inner.items.partition_point(|i| i.execute_at <= execute_at);
        inner.items.insert(
            idx,
            DelayedItem {
                value: item,
                delay,
                enqueued_at: now,
                execute_at,
            },
        );

        promote_ready(shared, &mut inner, now);

        // Over the limit only if nothing was promoted, so the new item is
        // still at `idx`.
        if let Some(limit) = shared.capacity.limit() {
            if inner.items.len() > limit {
                if let Some(rejected) = inner.items.remove(idx) {
                    shared.metrics.inc_rejected_full();
                    return Err(OfferError::Full(rejected.value));
                }
            }
        }

        shared.metrics.inc_enqueued();
        trace!(
            queue = %shared.name,
            delay_ms = delay.as_millis() as u64,
            len = inner.items.len(),
            "delayed item enqueued"
        );
        Ok(())
    }

    /// Take the earliest ready item, suspending until one becomes ready.
    ///
    /// Resolves to `Ok(None)` when the queue is shut down and holds no ready
    /// item, and to `Err(QueueError::Shutdown)` if it shuts down while this
    /// call is waiting. A dropped call gives back any item already handed to
    /// it as a ready item.
    pub async fn dequeue(&self) -> Result<Option<T>, QueueError> {
        let mut pending = match self.take_or_register() {
            Registration::Done(item) => return Ok(item),
            Registration::Waiting(_, rx) => Pending::new(&*self.shared, rx),
        };

        match pending.receiver().await {
            Ok(item) => {
                self.shared.metrics.inc_dequeued();
                Ok(Some(item))
            }
            Err(_) => Err(QueueError::Shutdown),
        }
    }

    /// Like [`dequeue`](DelayedQueue::dequeue), but gives up after `timeout`
    /// and resolves to `Ok(None)`. The waiter is withdrawn on timeout.
    pub async fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<T>, QueueError> {
        let (id, mut pending) = match self.take_or_register() {
            Registration::Done(item) => return Ok(item),
            Registration::Waiting(id, rx) => (id, Pending::new(&*self.shared, rx)),
        };

        match time::timeout(timeout, pending.receiver()).await {
            Ok(Ok(item)) => {
                self.shared.metrics.inc_dequeued();
                Ok(Some(item))
            }
            Ok(Err(_)) => Err(QueueError::Shutdown),
            Err(_) => {
                let withdrawn = self.shared.inner.lock().waiters.remove(id);
                if withdrawn {
                    self.shared.metrics.inc_timed_out();
                    trace!(queue = %self.shared.name, "dequeue timed out");
                    return Ok(None);
                }
                // Fulfilled or rejected between the deadline and the lock.
                match pending.receiver().try_recv() {
                    Ok(item) => {
                        self.shared.metrics.inc_dequeued();
                        Ok(Some(item))
                    }
                    Err(_) => Err(QueueError::Shutdown),
                }
            }
        }
    }

    /// Take the earliest ready item without suspending.
    pub fn try_dequeue(&self) -> Option<T> {
        let now = Instant::now();
        let mut inner = self.shared.inner.lock();
        let item = take_ready(&mut inner, now);
        if item.is_some() {
            self.shared.metrics.inc_dequeued();
        }
        item
    }

    fn take_or_register(&self) -> Registration<T> {
        let now = Instant::now();
        let mut inner = self.shared.inner.lock();
        if let Some(item) = take_ready(&mut inner, now) {
            self.shared.metrics.inc_dequeued();
            return Registration::Done(Some(item));
        }
        if inner.shutdown {
            return Registration::Done(None);
        }
        let (id, rx) = inner.waiters.register();
        Registration::Waiting(id, rx)
    }

    /// Remove every not-yet-ready item whose value matches. Ready items and
    /// waiters are untouched. Returns the number removed.
    pub fn cancel_delayed<F>(&self, mut matcher: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let now = Instant::now();
        let mut inner = self.shared.inner.lock();
        let before = inner.items.len();
        inner.items.retain(|i| i.is_ready(now) || !matcher(&i.value));
        let removed = before - inner.items.len();

        if removed > 0 {
            self.shared.metrics.inc_cancelled(removed as u64);
            debug!(queue = %self.shared.name, removed, "cancelled delayed items");
        }
        removed
    }

    /// When the next item is or becomes ready: `now` if one is ready already,
    /// the earliest deadline otherwise, `None` for an empty queue.
    pub fn next_ready_time(&self) -> Option<Instant> {
        let now = Instant::now();
        let inner = self.shared.inner.lock();
        inner
            .items
            .front()
            .map(|i| if i.is_ready(now) { now } else { i.execute_at })
    }

    /// Earliest stored item with its schedule, ready or not.
    pub fn peek_item(&self) -> Option<DelayedItem<T>>
    where
        T: Clone,
    {
        self.shared.inner.lock().items.front().cloned()
    }

    /// Number of stored items, ready or pending.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored items that are ready now.
    pub fn ready_len(&self) -> usize {
        let now = Instant::now();
        let inner = self.shared.inner.lock();
        inner.items.partition_point(|i| i.is_ready(now))
    }

    pub fn waiter_count(&self) -> usize {
        self.shared.inner.lock().waiters.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.inner.lock().shutdown
    }

    /// Stop the sweep and reject every suspended consumer. Pending items stay
    /// stored but are never promoted to waiters again.
    ///
    /// `dequeue` and `try_dequeue` keep draining after shutdown, and that
    /// includes items whose deadline passes after the call: a pending item
    /// is still returned once it is ready.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }

        let mut inner = self.shared.inner.lock();
        if inner.shutdown {
            return;
        }
        inner.shutdown = true;
        let rejected = inner.waiters.reject_all();
        debug!(
            queue = %self.shared.name,
            rejected,
            pending = inner.items.len(),
            "delayed queue shut down"
        );
    }
}

impl<T> Drop for DelayedQueue<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

impl<T> Requeue<T> for Shared<T> {
    /// Offer the item to the next waiter, otherwise store it as the earliest
    /// ready item.
    fn requeue(&self, item: T) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if let Err(value) = inner.waiters.deliver(item) {
            let execute_at = inner
                .items
                .front()
                .map_or(now, |front| front.execute_at.min(now));
            inner.items.push_front(DelayedItem {
                value,
                delay: Duration::ZERO,
                enqueued_at: now,
                execute_at,
            });
            trace!(queue = %self.name, "returned item restored as ready");
        }
    }
}

impl<T: Send> QueueBehavior<T> for DelayedQueue<T> {
    fn name(&self) -> &str {
        DelayedQueue::name(self)
    }

    fn capacity(&self) -> Capacity {
        DelayedQueue::capacity(self)
    }

    fn enqueue(&self, item: T) -> Result<(), OfferError<T>> {
        DelayedQueue::enqueue(self, item)
    }

    fn try_dequeue(&self) -> Option<T> {
        DelayedQueue::try_dequeue(self)
    }

    fn len(&self) -> usize {
        DelayedQueue::len(self)
    }

    fn is_shutdown(&self) -> bool {
        DelayedQueue::is_shutdown(self)
    }

    fn shutdown(&self) {
        DelayedQueue::shutdown(self)
    }
}

enum Registration<T> {
    Done(Option<T>),
    Waiting(WaiterId, oneshot::Receiver<T>),
}

fn take_ready<T>(inner: &mut DelayedInner<T>, now: Instant) -> Option<T> {
    match inner.items.front() {
        Some(front) if front.is_ready(now) => inner.items.pop_front().map(|i| i.value),
        _ => None,
    }
}

/// Hand ready items to waiters, earliest deadline to oldest waiter, until
/// either runs out. Shared by the enqueue path and the sweep so an item is
/// delivered at most once. Returns the number promoted.
fn promote_ready<T>(shared: &Shared<T>, inner: &mut DelayedInner<T>, now: Instant) -> usize {
    let mut promoted = 0;
    while inner.items.front().is_some_and(|i| i.is_ready(now)) && inner.waiters.has_live() {
        let Some(DelayedItem {
            value,
            delay,
            enqueued_at,
            execute_at,
        }) = inner.items.pop_front()
        else {
            break;
        };
        match inner.waiters.deliver(value) {
            Ok(()) => promoted += 1,
            Err(value) => {
                // Every waiter vanished mid-delivery; put the item back.
                inner.items.push_front(DelayedItem {
                    value,
                    delay,
                    enqueued_at,
                    execute_at,
                });
                break;
            }
        }
    }

    if promoted > 0 {
        shared.metrics.inc_promoted(promoted as u64);
    }
    promoted
}

async fn sweep_loop<T>(weak: Weak<Shared<T>>) {
    let mut ticker = time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = weak.upgrade() else {
            break;
        };
        let promoted = {
            let mut inner = shared.inner.lock();
            if inner.shutdown {
                break;
            }
            promote_ready(&shared, &mut inner, Instant::now())
        };
        if promoted > 0 {
            debug!(queue = %shared.name, promoted, "sweep promoted ready items");
        }
    }
}
