//! FIFO list of suspended consumers.
//!
//! Each waiter is the sending half of a oneshot channel; the consumer holds
//! the receiver. Waiters are woken strictly in registration order. A waiter
//! whose consumer went away (receiver dropped) is skipped, and the item moves
//! on to the next live waiter. Rejection drops the sender, which the consumer
//! observes as a closed channel.
//!
//! A consumer that is cancelled after its waiter was fulfilled but before it
//! observed the item would take the item down with it. [`Pending`] closes
//! the receiver on drop and hands any such item back through [`Requeue`].

use std::collections::VecDeque;

use tokio::sync::oneshot;

/// Identifies a registered waiter so a timed-out consumer can withdraw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

#[derive(Debug)]
struct Waiter<T> {
    id: WaiterId,
    tx: oneshot::Sender<T>,
}

#[derive(Debug)]
pub struct WaiterList<T> {
    next_id: u64,
    waiters: VecDeque<Waiter<T>>,
}

impl<T> WaiterList<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            waiters: VecDeque::new(),
        }
    }

    /// Register a new waiter at the back of the list.
    pub fn register(&mut self) -> (WaiterId, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let id = WaiterId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.waiters.push_back(Waiter { id, tx });
        (id, rx)
    }

    /// Hand `item` to the oldest live waiter. Gives the item back when no
    /// live waiter is left.
    pub fn deliver(&mut self, mut item: T) -> Result<(), T> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(item) {
                Ok(()) => return Ok(()),
                Err(returned) => item = returned,
            }
        }
        Err(item)
    }

    /// Withdraw a waiter. Returns `false` if it was already fulfilled or
    /// rejected.
    pub fn remove(&mut self, id: WaiterId) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop every pending waiter. Returns how many were still live.
    pub fn reject_all(&mut self) -> usize {
        self.waiters
            .drain(..)
            .filter(|w| !w.tx.is_closed())
            .count()
    }

    /// Returns `true` if at least one consumer is still waiting. Prunes
    /// abandoned waiters as a side effect.
    pub fn has_live(&mut self) -> bool {
        self.waiters.retain(|w| !w.tx.is_closed());
        !self.waiters.is_empty()
    }

    /// Number of live waiters.
    pub fn len(&self) -> usize {
        self.waiters.iter().filter(|w| !w.tx.is_closed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Takes back an item whose consumer went away after it was handed over.
pub(crate) trait Requeue<T> {
    fn requeue(&self, item: T);
}

/// Receiving side of a registered waiter, tied to the queue it came from.
pub(crate) struct Pending<'a, T, Q: Requeue<T>> {
    queue: &'a Q,
    rx: oneshot::Receiver<T>,
}

impl<'a, T, Q: Requeue<T>> Pending<'a, T, Q> {
    pub(crate) fn new(queue: &'a Q, rx: oneshot::Receiver<T>) -> Self {
        Self { queue, rx }
    }

    pub(crate) fn receiver(&mut self) -> &mut oneshot::Receiver<T> {
        &mut self.rx
    }
}

impl<T, Q: Requeue<T>> Drop for Pending<'_, T, Q> {
    fn drop(&mut self) {
        // After close() no sender can succeed, so try_recv sees the final
        // state: an item delivered but never received, or nothing.
        self.rx.close();
        if let Ok(item) = self.rx.try_recv() {
            self.queue.requeue(item);
        }
    }
}

impl<T> Default for WaiterList<T> {
    fn default() -> Self {
        Self::new()
    }
}
