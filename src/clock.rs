//! Time source used by the latency middleware.
//!
//! Two reads per request: [`Clock::now`] before the handler runs and
//! [`Clock::elapsed`] after it returns. Swap in a [`FixedClock`] to make the
//! measured latency deterministic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A point-in-time read plus an elapsed-since computation.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Time elapsed since `since`. Never negative.
    fn elapsed(&self, since: Instant) -> Duration;
}

/// The monotonic system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: Instant) -> Duration {
        // saturates to zero if `since` is in the future
        Instant::now().saturating_duration_since(since)
    }
}

/// A clock frozen at construction time that reports a configurable elapsed
/// duration.
///
/// Clones share the elapsed value, so a test can keep one clone and change
/// what the middleware observes between requests:
///
/// ```rust
/// use std::time::Duration;
/// use latencywatch::clock::{Clock, FixedClock};
///
/// let clock = FixedClock::new(Duration::from_micros(10));
/// let start = clock.now();
/// assert_eq!(clock.elapsed(start), Duration::from_micros(10));
///
/// clock.set_elapsed(Duration::from_millis(3));
/// assert_eq!(clock.elapsed(start), Duration::from_millis(3));
/// ```
#[derive(Clone, Debug)]
pub struct FixedClock {
    now: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl FixedClock {
    pub fn new(elapsed: Duration) -> Self {
        Self { now: Instant::now(), elapsed: Arc::new(Mutex::new(elapsed)) }
    }

    pub fn set_elapsed(&self, elapsed: Duration) {
        *self.elapsed.lock() = elapsed;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        self.now
    }

    fn elapsed(&self, _since: Instant) -> Duration {
        *self.elapsed.lock()
    }
}
