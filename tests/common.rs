#![allow(dead_code)]

use std::sync::Once;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = blipq::logging::init_logging();
    });
}

/// Yield to the runtime until `count()` reports `n` suspended consumers.
pub async fn wait_for_waiters(count: impl Fn() -> usize, n: usize) {
    for _ in 0..1_000 {
        if count() == n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {n} waiter(s), found {}", count());
}
