//! Time sources for the synchronization manager.
//!
//! Everything time-dependent (throttling, blending, eviction, retry deadlines)
//! reads the current instant through [`Clock`] so it can be driven by a
//! [`ManualClock`] in tests and simulations.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock {
    /// Monotonic now, used for all interval arithmetic.
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch, stamped on outbound messages.
    fn unix_ms(&self) -> u64;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same elapsed time, so a test can keep one handle while the
/// manager owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    unix_origin_ms: u64,
    elapsed: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Create a clock at elapsed time zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            unix_origin_ms: SystemClock.unix_ms(),
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    /// Move time forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Jump to an absolute elapsed time. Never moves backwards.
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.elapsed.set(elapsed.max(self.elapsed.get()));
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn unix_ms(&self) -> u64 {
        self.unix_origin_ms + self.elapsed.get().as_millis() as u64
    }
}
