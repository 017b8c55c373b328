mod common;

use std::sync::Arc;
use std::time::Duration;

use blipq::core::queue::delayed::MAX_DELAY;
use blipq::{DelayedQueue, QueueError, RejectReason};
use futures::FutureExt;
use tokio::time::{self, Instant};

use common::wait_for_waiters;

const MS: Duration = Duration::from_millis(1);

#[tokio::test(start_paused = true)]
async fn zero_delay_is_ready_immediately() {
    let q = DelayedQueue::unbounded();
    q.enqueue_delayed("now", Duration::ZERO).unwrap();

    assert_eq!(q.ready_len(), 1);
    assert_eq!(q.next_ready_time(), Some(Instant::now()));
    assert_eq!(q.try_dequeue(), Some("now"));
    assert_eq!(q.next_ready_time(), None);
}

#[tokio::test(start_paused = true)]
async fn delayed_item_waits_for_its_deadline() {
    let q = DelayedQueue::unbounded();
    q.enqueue_delayed("x", 500 * MS).unwrap();

    assert!(q.try_dequeue().is_none());
    assert!(q.dequeue().now_or_never().is_none());
    assert_eq!(q.ready_len(), 0);

    time::sleep(500 * MS).await;
    assert_eq!(q.dequeue().await, Ok(Some("x")));
}

#[tokio::test(start_paused = true)]
async fn timed_dequeue_gives_up_then_plain_dequeue_succeeds() {
    let q = DelayedQueue::unbounded();
    let start = Instant::now();
    q.enqueue_delayed("x", 1000 * MS).unwrap();

    time::sleep(10 * MS).await;
    assert_eq!(q.dequeue_timeout(100 * MS).await, Ok(None));
    let waited = start.elapsed();
    assert!(waited >= 110 * MS && waited < 200 * MS, "waited {waited:?}");
    assert_eq!(q.waiter_count(), 0, "timed-out waiter must be withdrawn");
    assert_eq!(q.metrics().snapshot().timed_out, 1);

    time::sleep_until(start + 1100 * MS).await;
    assert_eq!(q.dequeue().await, Ok(Some("x")));
}

#[tokio::test(start_paused = true)]
async fn sweep_promotes_to_waiting_consumer() {
    let q = Arc::new(DelayedQueue::unbounded());
    let start = Instant::now();
    q.enqueue_delayed(7, 250 * MS).unwrap();

    let got = q.dequeue().await;
    let waited = start.elapsed();

    assert_eq!(got, Ok(Some(7)));
    assert!(waited >= 250 * MS && waited <= 350 * MS, "waited {waited:?}");
    assert_eq!(q.metrics().snapshot().promoted, 1);
    assert!(q.is_empty());
}

#[tokio::test(start_paused = true)]
async fn ready_enqueue_goes_straight_to_waiter() {
    let q = Arc::new(DelayedQueue::unbounded());

    let consumer = tokio::spawn({
        let q = Arc::clone(&q);
        async move { q.dequeue_timeout(50 * MS).await }
    });
    wait_for_waiters(|| q.waiter_count(), 1).await;

    q.enqueue("hot").unwrap();
    assert!(q.is_empty());
    assert_eq!(consumer.await.unwrap(), Ok(Some("hot")));
}

#[tokio::test(start_paused = true)]
async fn readiness_order_is_by_deadline_then_insertion() {
    let q = DelayedQueue::unbounded();
    q.enqueue_delayed("c", 300 * MS).unwrap();
    q.enqueue_delayed("a1", 100 * MS).unwrap();
    q.enqueue_delayed("b", 200 * MS).unwrap();
    q.enqueue_delayed("a2", 100 * MS).unwrap();

    time::sleep(300 * MS).await;

    let mut order = Vec::new();
    while let Some(item) = q.try_dequeue() {
        order.push(item);
    }
    assert_eq!(order, vec!["a1", "a2", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn cancel_removes_only_pending_matches() {
    let q = DelayedQueue::unbounded();
    q.enqueue("ready-job").unwrap();
    q.enqueue_delayed("job-1", 1000 * MS).unwrap();
    q.enqueue_delayed("job-2", 2000 * MS).unwrap();
    q.enqueue_delayed("keep", 1000 * MS).unwrap();

    let removed = q.cancel_delayed(|v| v.contains("job"));
    assert_eq!(removed, 2);
    assert_eq!(q.len(), 2);
    assert_eq!(q.metrics().snapshot().cancelled, 2);

    assert_eq!(q.try_dequeue(), Some("ready-job"));
    assert_eq!(q.cancel_delayed(|_| false), 0);

    time::sleep(1000 * MS).await;
    assert_eq!(q.try_dequeue(), Some("keep"));
}

#[tokio::test(start_paused = true)]
async fn next_ready_time_reports_earliest_deadline() {
    let q = DelayedQueue::unbounded();
    assert_eq!(q.next_ready_time(), None);

    let start = Instant::now();
    q.enqueue_delayed(2, 800 * MS).unwrap();
    q.enqueue_delayed(1, 300 * MS).unwrap();
    assert_eq!(q.next_ready_time(), Some(start + 300 * MS));

    let head = q.peek_item().unwrap();
    assert_eq!(head.value, 1);
    assert_eq!(head.delay, 300 * MS);
    assert_eq!(head.enqueued_at, start);

    time::sleep(400 * MS).await;
    assert_eq!(q.next_ready_time(), Some(Instant::now()));
}

#[tokio::test(start_paused = true)]
async fn cancelled_timed_consumer_gives_back_handed_item() {
    let q = DelayedQueue::unbounded();
    let mut consumer = Box::pin(q.dequeue_timeout(5000 * MS));
    assert!((&mut consumer).now_or_never().is_none());

    q.enqueue(7).unwrap();
    assert_eq!(q.len(), 0, "handed to the suspended consumer");

    drop(consumer);
    assert_eq!(q.ready_len(), 1);
    assert_eq!(q.try_dequeue(), Some(7));
}

#[tokio::test(start_paused = true)]
async fn cancelled_consumer_item_returns_ahead_of_later_deadlines() {
    let q = DelayedQueue::unbounded();
    q.enqueue_delayed(1, 50 * MS).unwrap();
    q.enqueue_delayed(2, 120 * MS).unwrap();

    let mut consumer = Box::pin(q.dequeue());
    assert!((&mut consumer).now_or_never().is_none());

    // The 100 ms sweep hands 1 over; the consumer never looks at it.
    time::sleep(150 * MS).await;
    assert_eq!(q.metrics().snapshot().promoted, 1);
    assert_eq!(q.len(), 1);

    drop(consumer);
    assert_eq!(q.try_dequeue(), Some(1));
    assert_eq!(q.try_dequeue(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn huge_delay_is_clamped() {
    let q = DelayedQueue::unbounded();
    q.enqueue_delayed(1, Duration::MAX).unwrap();

    assert_eq!(q.peek_item().unwrap().delay, MAX_DELAY);
    let year = Duration::from_secs(365 * 86_400);
    assert!(q.next_ready_time().unwrap() > Instant::now() + year);
    assert_eq!(q.try_dequeue(), None);
    assert_eq!(q.cancel_delayed(|_| true), 1);
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_pending_items() {
    let q = DelayedQueue::bounded(1);
    q.enqueue_delayed(1, 100 * MS).unwrap();

    let err = q.enqueue_delayed(2, 50 * MS).unwrap_err();
    assert_eq!(err.reason(), RejectReason::Full);
    assert_eq!(q.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_rejects_waiters_and_leaves_pending_items() {
    let q = Arc::new(DelayedQueue::<&str>::unbounded());
    q.enqueue_delayed("later", 200 * MS).unwrap();

    let consumer = tokio::spawn({
        let q = Arc::clone(&q);
        async move { q.dequeue().await }
    });
    wait_for_waiters(|| q.waiter_count(), 1).await;

    q.shutdown();
    q.shutdown();
    assert_eq!(consumer.await.unwrap(), Err(QueueError::Shutdown));

    assert!(q.enqueue("new").unwrap_err().is_shutdown());
    assert_eq!(q.len(), 1, "pending items stay stored");
    assert_eq!(q.dequeue().await, Ok(None));

    time::sleep(300 * MS).await;
    assert_eq!(q.metrics().snapshot().promoted, 0);
    assert_eq!(q.dequeue().await, Ok(Some("later")));
}
