mod common;

use std::sync::Arc;

use blipq::{
    Capacity, DelayedQueue, MemoryQueue, PersistentQueue, QueueBehavior, QueueError, RejectReason,
};
use futures::FutureExt;

use common::{init_logging, wait_for_waiters};

fn fill_two_then_reject<Q: QueueBehavior<u32>>(q: &Q) {
    assert_eq!(q.capacity(), Capacity::Bounded(2));
    q.enqueue(1).unwrap();
    q.enqueue(2).unwrap();

    let err = q.enqueue(3).unwrap_err();
    assert_eq!(err.reason(), RejectReason::Full);
    assert_eq!(err.into_inner(), 3);
    assert_eq!(q.len(), 2);

    assert_eq!(q.try_dequeue(), Some(1));
    assert_eq!(q.try_dequeue(), Some(2));
    assert!(q.is_empty());
}

#[tokio::test]
async fn every_variant_rejects_beyond_capacity() {
    init_logging();
    fill_two_then_reject(&MemoryQueue::bounded(2));
    fill_two_then_reject(&DelayedQueue::bounded(2));
    fill_two_then_reject(&PersistentQueue::bounded(2));
}

#[tokio::test]
async fn bounded_scenario_returns_in_order() {
    let q = MemoryQueue::bounded(2);
    q.enqueue("A").unwrap();
    q.enqueue("B").unwrap();
    assert!(q.enqueue("C").unwrap_err().is_full());

    assert_eq!(q.dequeue().await, Ok(Some("A")));
    assert_eq!(q.dequeue().await, Ok(Some("B")));
}

#[tokio::test]
async fn unbounded_keeps_fifo_order() {
    let q = MemoryQueue::unbounded();
    for i in 0..1_000 {
        q.enqueue(i).unwrap();
    }
    for i in 0..1_000 {
        assert_eq!(q.dequeue().await, Ok(Some(i)));
    }
}

#[tokio::test]
async fn waiting_consumer_gets_item_before_storage() {
    let q = Arc::new(MemoryQueue::unbounded());

    let consumer = tokio::spawn({
        let q = Arc::clone(&q);
        async move { q.dequeue().await }
    });
    wait_for_waiters(|| q.waiter_count(), 1).await;

    q.enqueue("first").unwrap();
    assert!(q.is_empty(), "handed-off item must not be stored");
    q.enqueue("second").unwrap();

    assert_eq!(consumer.await.unwrap(), Ok(Some("first")));
    assert_eq!(q.try_dequeue(), Some("second"));
    assert_eq!(q.metrics().snapshot().handed_off, 1);
}

#[tokio::test]
async fn waiters_are_served_in_registration_order() {
    let q = Arc::new(MemoryQueue::unbounded());

    let mut consumers = Vec::new();
    for n in 1..=3 {
        let q2 = Arc::clone(&q);
        consumers.push(tokio::spawn(async move { q2.dequeue().await }));
        wait_for_waiters(|| q.waiter_count(), n).await;
    }

    for item in ["a", "b", "c"] {
        q.enqueue(item).unwrap();
    }

    let mut got = Vec::new();
    for c in consumers {
        got.push(c.await.unwrap().unwrap().unwrap());
    }
    assert_eq!(got, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn zero_capacity_queue_is_a_rendezvous() {
    let q = Arc::new(MemoryQueue::bounded(0));
    assert!(q.enqueue(1).unwrap_err().is_full());

    let consumer = tokio::spawn({
        let q = Arc::clone(&q);
        async move { q.dequeue().await }
    });
    wait_for_waiters(|| q.waiter_count(), 1).await;

    q.enqueue(2).unwrap();
    assert_eq!(consumer.await.unwrap(), Ok(Some(2)));
}

#[tokio::test]
async fn dropped_dequeue_does_not_swallow_items() {
    let q = MemoryQueue::unbounded();
    assert!(q.dequeue().now_or_never().is_none());

    q.enqueue(1).unwrap();
    assert_eq!(q.len(), 1);
    assert_eq!(q.dequeue().await, Ok(Some(1)));
}

#[tokio::test]
async fn cancelled_consumer_gives_back_handed_item() {
    let q = MemoryQueue::unbounded();
    let mut consumer = Box::pin(q.dequeue());
    assert!((&mut consumer).now_or_never().is_none());

    q.enqueue(42).unwrap();
    q.enqueue(43).unwrap();
    assert_eq!(q.len(), 1, "42 went to the suspended consumer");

    drop(consumer);
    assert_eq!(q.try_dequeue(), Some(42));
    assert_eq!(q.try_dequeue(), Some(43));
}

#[tokio::test]
async fn cancelled_consumer_passes_item_to_next_waiter() {
    let q = MemoryQueue::unbounded();
    let mut first = Box::pin(q.dequeue());
    let mut second = Box::pin(q.dequeue());
    assert!((&mut first).now_or_never().is_none());
    assert!((&mut second).now_or_never().is_none());

    q.enqueue(1).unwrap();
    drop(first);
    assert!(q.is_empty());
    assert_eq!(second.await, Ok(Some(1)));
}

#[tokio::test]
async fn cancelled_persistent_consumer_keeps_item_and_write_count() {
    let q = PersistentQueue::bounded(4);
    let mut consumer = Box::pin(q.dequeue());
    assert!((&mut consumer).now_or_never().is_none());

    q.enqueue(5u32).unwrap();
    drop(consumer);
    assert_eq!(q.peek(), Some(5));
    assert_eq!(q.persistence_status().pending_writes, 1, "only the enqueue");
}

#[tokio::test]
async fn shutdown_drains_then_returns_none() {
    let q = MemoryQueue::unbounded();
    q.enqueue(1).unwrap();
    q.enqueue(2).unwrap();
    q.shutdown();

    assert_eq!(q.enqueue(3).unwrap_err().reason(), RejectReason::Shutdown);
    assert_eq!(q.dequeue().await, Ok(Some(1)));
    assert_eq!(q.dequeue().await, Ok(Some(2)));
    assert_eq!(q.dequeue().await, Ok(None));
    assert_eq!(q.dequeue().await, Ok(None));
}

#[tokio::test]
async fn shutdown_rejects_waiters_once() {
    let q = Arc::new(MemoryQueue::<u32>::unbounded());

    let consumer = tokio::spawn({
        let q = Arc::clone(&q);
        async move { q.dequeue().await }
    });
    wait_for_waiters(|| q.waiter_count(), 1).await;

    q.shutdown();
    assert_eq!(consumer.await.unwrap(), Err(QueueError::Shutdown));
    assert_eq!(q.waiter_count(), 0);

    q.shutdown();
    assert!(q.is_shutdown());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_lose_nothing() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 2_500;

    let q = Arc::new(MemoryQueue::unbounded());

    let consumer = tokio::spawn({
        let q = Arc::clone(&q);
        async move {
            let mut count = 0usize;
            while count < PRODUCERS * PER_PRODUCER {
                if q.dequeue().await.unwrap().is_some() {
                    count += 1;
                }
            }
            count
        }
    });

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let q = Arc::clone(&q);
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                q.enqueue(p * PER_PRODUCER + i).unwrap();
            }
        }));
    }
    for p in producers {
        p.await.unwrap();
    }

    assert_eq!(consumer.await.unwrap(), PRODUCERS * PER_PRODUCER);
    assert!(q.is_empty());
}
