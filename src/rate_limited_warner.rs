use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Default interval between repeated failure summaries.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Helper that rate limits warnings about payloads failed during an outage.
///
/// The worker increments the counter via [`record_failure`](Self::record_failure).
/// The next call to [`warn_if_due`](Self::warn_if_due) invokes the callback
/// with the accumulated count when the interval has elapsed.
/// [`flush`](Self::flush) reports any pending count immediately.
pub struct RateLimitedWarner {
    origin: Instant,
    interval_ms: u64,
    last_warn_ms: AtomicU64,
    failed: AtomicU64,
    warned_once: AtomicBool,
}

impl RateLimitedWarner {
    /// Create a warner. The first warning can be emitted immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            last_warn_ms: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            warned_once: AtomicBool::new(false),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Increment the failed-payload counter.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = self.now_ms();
        let prev = self.last_warn_ms.load(Ordering::Relaxed);
        let first = !self.warned_once.load(Ordering::Relaxed);
        if first || now.saturating_sub(prev) >= self.interval_ms {
            let count = self.failed.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn(count);
                self.warned_once.store(true, Ordering::Relaxed);
                self.last_warn_ms.store(now, Ordering::Relaxed);
            }
        }
    }

    /// Immediately warn about any pending failures.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.failed.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.warned_once.store(true, Ordering::Relaxed);
            self.last_warn_ms.store(self.now_ms(), Ordering::Relaxed);
        }
    }
}
