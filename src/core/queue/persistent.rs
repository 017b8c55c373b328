//! Persistent queue.
//!
//! A [`MemoryQueue`] of [`PersistedItem`]s plus write-back bookkeeping: every
//! accepted enqueue and every dequeue counts as a pending write, and a
//! periodic task flushes a snapshot of the queue to the configured
//! [`PersistenceBackend`]. Flush and recovery failures are recorded in the
//! [`PersistenceStatus`] rather than returned.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::core::capacity::Capacity;
use crate::core::error::{OfferError, PersistError, QueueError};
use crate::core::persistence::{
    MemoryBackend, PersistedItem, PersistenceBackend, PersistenceStatus, StorageType,
    UnsupportedBackend,
};
use crate::core::queue::{MemoryQueue, QueueBehavior};
use crate::metrics::QueueMetrics;
use crate::util::current_timestamp;

#[derive(Debug, Default)]
struct WriteBack {
    pending_writes: u64,
    last_error: Option<String>,
    last_persisted_at: Option<u64>,
    closed: bool,
}

struct Shared<T> {
    queue: MemoryQueue<PersistedItem<T>>,
    backend: Arc<dyn PersistenceBackend<T>>,
    state: Mutex<WriteBack>,
}

impl<T: Clone> Shared<T> {
    fn mark_write(&self) {
        self.mark_writes(1);
    }

    fn mark_writes(&self, n: u64) {
        self.state.lock().pending_writes += n;
    }

    fn record_error(&self, err: &PersistError) {
        self.state.lock().last_error = Some(err.to_string());
    }

    /// Flush a snapshot to the backend and update the watermark.
    fn persist(&self) {
        let (snapshot, flushed) = {
            let state = self.state.lock();
            (self.queue.snapshot(), state.pending_writes)
        };

        let result = self.backend.store(&snapshot);

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                // Writes that landed during the store stay pending.
                state.pending_writes = state.pending_writes.saturating_sub(flushed);
                state.last_persisted_at = Some(current_timestamp());
                state.last_error = None;
                self.queue.metrics().inc_flushes();
                debug!(
                    queue = %self.queue.name(),
                    items = snapshot.len(),
                    flushed,
                    "persisted queue snapshot"
                );
            }
            Err(err) => {
                state.last_error = Some(err.to_string());
                self.queue.metrics().inc_flush_failures();
                warn!(
                    queue = %self.queue.name(),
                    backend = %self.backend.kind(),
                    error = %err,
                    "failed to persist queue snapshot"
                );
            }
        }
    }
}

/// FIFO queue with write-back persistence.
///
/// Must be created inside a Tokio runtime: construction spawns the sync task,
/// which stops on [`shutdown`](PersistentQueue::shutdown) or when the queue
/// is dropped.
pub struct PersistentQueue<T> {
    shared: Arc<Shared<T>>,
    config: PersistenceConfig,
    syncer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + 'static> PersistentQueue<T> {
    /// Build a queue on the backend selected by `config.storage_type`.
    ///
    /// Only in-memory storage is implemented; other storage types get a
    /// backend that fails every call, which shows up in
    /// [`persistence_status`](PersistentQueue::persistence_status).
    pub fn new(name: impl Into<String>, capacity: Capacity, config: PersistenceConfig) -> Self {
        let backend: Arc<dyn PersistenceBackend<T>> = match config.storage_type {
            StorageType::Memory => Arc::new(MemoryBackend::new()),
            other => {
                warn!(
                    storage_type = %other,
                    location = config.location().unwrap_or("<unset>"),
                    "storage type not available, flushes will fail"
                );
                Arc::new(UnsupportedBackend::new(
                    other,
                    config.location().map(str::to_string),
                ))
            }
        };
        Self::with_backend(name, capacity, config, backend)
    }

    pub fn with_backend(
        name: impl Into<String>,
        capacity: Capacity,
        config: PersistenceConfig,
        backend: Arc<dyn PersistenceBackend<T>>,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: MemoryQueue::new(name, capacity),
            backend,
            state: Mutex::new(WriteBack::default()),
        });

        let syncer = tokio::spawn(sync_loop(Arc::downgrade(&shared), config.sync_interval()));

        let queue = Self {
            shared,
            config,
            syncer: Mutex::new(Some(syncer)),
        };

        if queue.config.auto_recover {
            queue.recover();
        }
        queue
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(
            "persistent",
            Capacity::Bounded(capacity),
            PersistenceConfig::default(),
        )
    }
}

impl<T: Clone> PersistentQueue<T> {
    pub fn name(&self) -> &str {
        self.shared.queue.name()
    }

    pub fn capacity(&self) -> Capacity {
        self.shared.queue.capacity()
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        self.shared.queue.metrics()
    }

    pub fn enqueue(&self, item: T) -> Result<(), OfferError<T>> {
        match self.shared.queue.enqueue(PersistedItem::new(item)) {
            Ok(()) => {
                self.shared.mark_write();
                Ok(())
            }
            Err(OfferError::Full(p)) => Err(OfferError::Full(p.value)),
            Err(OfferError::Shutdown(p)) => Err(OfferError::Shutdown(p.value)),
        }
    }

    /// Same contract as [`MemoryQueue::dequeue`].
    pub async fn dequeue(&self) -> Result<Option<T>, QueueError> {
        let item = self.shared.queue.dequeue().await?;
        if item.is_some() {
            self.shared.mark_write();
        }
        Ok(item.map(|p| p.value))
    }

    pub fn try_dequeue(&self) -> Option<T> {
        let item = self.shared.queue.try_dequeue()?;
        self.shared.mark_write();
        Some(item.value)
    }

    pub fn peek(&self) -> Option<T> {
        self.shared.queue.peek().map(|p| p.value)
    }

    /// Head item with its persistence metadata.
    pub fn peek_item(&self) -> Option<PersistedItem<T>> {
        self.shared.queue.peek()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn waiter_count(&self) -> usize {
        self.shared.queue.waiter_count()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.queue.is_shutdown()
    }

    pub fn persistence_status(&self) -> PersistenceStatus {
        let state = self.shared.state.lock();
        PersistenceStatus {
            is_persisted: state.pending_writes == 0,
            last_error: state.last_error.clone(),
            pending_writes: state.pending_writes,
            last_persisted_at: state.last_persisted_at,
        }
    }

    /// Flush now instead of waiting for the next sync tick.
    pub fn flush(&self) {
        self.shared.persist();
    }

    /// Reload the backend snapshot into an empty queue.
    ///
    /// Recovered items go to suspended consumers first, the rest are stored
    /// up to capacity. A queue that already holds items is left alone.
    /// Items dropped for capacity count as pending writes, since the backend
    /// still holds them; items taken by consumers are counted by their
    /// `dequeue`. Returns the number of items held in memory afterwards.
    pub fn recover(&self) -> usize {
        let queue = &self.shared.queue;
        if !queue.is_empty() {
            return queue.len();
        }

        let items = match self.shared.backend.load() {
            Ok(items) => items,
            Err(err) => {
                warn!(queue = %queue.name(), error = %err, "recovery failed");
                self.shared.record_error(&err);
                return queue.len();
            }
        };

        let loaded = items.len();
        let mut dropped = 0u64;
        for item in items {
            match queue.enqueue(item) {
                Ok(()) => {}
                Err(OfferError::Full(_)) => dropped += 1,
                Err(OfferError::Shutdown(_)) => {
                    warn!(queue = %queue.name(), "queue shut down during recovery");
                    break;
                }
            }
        }

        if dropped > 0 {
            self.shared.mark_writes(dropped);
            warn!(queue = %queue.name(), dropped, "recovered items exceed capacity, dropped");
        }
        info!(queue = %queue.name(), loaded, held = queue.len(), "recovered queue from backend");
        queue.len()
    }

    /// Stop the sync task, close the queue (rejecting offers and suspended
    /// consumers) and run one final flush. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.syncer.lock().take() {
            handle.abort();
        }

        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        self.shared.queue.shutdown();
        self.shared.persist();
        info!(queue = %self.name(), "persistent queue shut down");
    }
}

impl<T> Drop for PersistentQueue<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.syncer.get_mut().take() {
            handle.abort();
        }
    }
}

impl<T: Clone + Send> QueueBehavior<T> for PersistentQueue<T> {
    fn name(&self) -> &str {
        PersistentQueue::name(self)
    }

    fn capacity(&self) -> Capacity {
        PersistentQueue::capacity(self)
    }

    fn enqueue(&self, item: T) -> Result<(), OfferError<T>> {
        PersistentQueue::enqueue(self, item)
    }

    fn try_dequeue(&self) -> Option<T> {
        PersistentQueue::try_dequeue(self)
    }

    fn len(&self) -> usize {
        PersistentQueue::len(self)
    }

    fn is_shutdown(&self) -> bool {
        PersistentQueue::is_shutdown(self)
    }

    fn shutdown(&self) {
        PersistentQueue::shutdown(self)
    }
}

async fn sync_loop<T: Clone>(shared: Weak<Shared<T>>, period: time::Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.state.lock().closed {
            break;
        }
        shared.persist();
    }
}
