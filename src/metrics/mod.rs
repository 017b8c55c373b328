use std::sync::atomic::{AtomicU64, Ordering};

// Per-queue counters (low overhead). Relaxed ordering: these are coarse and
// only read for reporting.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    handed_off: AtomicU64,
    rejected_full: AtomicU64,
    rejected_shutdown: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    promoted: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub handed_off: u64,
    pub rejected_full: u64,
    pub rejected_shutdown: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub promoted: u64,
    pub flushes: u64,
    pub flush_failures: u64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_handed_off(&self) {
        self.handed_off.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_rejected_full(&self) {
        self.rejected_full.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_rejected_shutdown(&self) {
        self.rejected_shutdown.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_cancelled(&self, n: u64) {
        self.cancelled.fetch_add(n, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_promoted(&self, n: u64) {
        self.promoted.fetch_add(n, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_flushes(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_flush_failures(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            handed_off: self.handed_off.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_shutdown: self.rejected_shutdown.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            promoted: self.promoted.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
        }
    }

    /// Simple text format (Prometheus-style without HELP/TYPE lines), one
    /// line per counter labelled with the queue name.
    pub fn render(&self, queue: &str) -> String {
        let s = self.snapshot();
        let counters = [
            ("enqueued", s.enqueued),
            ("dequeued", s.dequeued),
            ("handed_off", s.handed_off),
            ("rejected_full", s.rejected_full),
            ("rejected_shutdown", s.rejected_shutdown),
            ("timed_out", s.timed_out),
            ("cancelled", s.cancelled),
            ("promoted", s.promoted),
            ("flushes", s.flushes),
            ("flush_failures", s.flush_failures),
        ];

        let mut out = String::new();
        for (name, value) in counters {
            out.push_str(&format!("blipq_{name}{{queue=\"{queue}\"}} {value}\n"));
        }
        out
    }
}
