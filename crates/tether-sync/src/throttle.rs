//! Outbound rate limiting.
//!
//! [`OutboundThrottle`] holds the latest local snapshot (last write wins) and
//! decides when it may leave. [`ErrorWindow`] keeps send failures from flooding
//! the log.

use std::time::{Duration, Instant};

use crate::messages::EntityState;

/// Rate limiter with a single-slot, last-write-wins buffer.
#[derive(Debug)]
pub struct OutboundThrottle {
    min_interval: Duration,
    last_send: Option<Instant>,
    latest: Option<EntityState>,
    pending: bool,
}

impl OutboundThrottle {
    /// Create a throttle allowing one send per `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: None,
            latest: None,
            pending: false,
        }
    }

    /// Buffer `snapshot`, replacing any unsent one, and return it if it may be
    /// sent right now.
    pub fn offer(
        &mut self,
        snapshot: EntityState,
        now: Instant,
        connected: bool,
    ) -> Option<EntityState> {
        self.latest = Some(snapshot);
        self.pending = true;
        self.poll(now, connected)
    }

    /// Release the buffered snapshot if one is pending, the link is up and the
    /// interval has elapsed. Called every tick for trailing sends.
    pub fn poll(&mut self, now: Instant, connected: bool) -> Option<EntityState> {
        if !connected || !self.pending || !self.interval_elapsed(now) {
            return None;
        }
        self.take(now)
    }

    /// The transport just connected: flush whatever was buffered while
    /// offline, or restart the interval if nothing was.
    pub fn on_connected(&mut self, now: Instant) -> Option<EntityState> {
        if self.pending {
            self.take(now)
        } else {
            self.last_send = Some(now);
            None
        }
    }

    /// Drop the buffer and forget the interval timer.
    pub fn clear(&mut self) {
        self.last_send = None;
        self.latest = None;
        self.pending = false;
    }

    /// Most recent snapshot handed to [`offer`](Self::offer), sent or not.
    pub fn latest(&self) -> Option<&EntityState> {
        self.latest.as_ref()
    }

    /// `true` if the latest snapshot has not been released yet.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        self.last_send
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval)
    }

    fn take(&mut self, now: Instant) -> Option<EntityState> {
        self.pending = false;
        self.last_send = Some(now);
        self.latest.clone()
    }
}

/// Allows one log line per rolling window and counts what it swallowed.
#[derive(Debug)]
pub struct ErrorWindow {
    window: Duration,
    last_logged: Option<Instant>,
    suppressed: u32,
}

impl ErrorWindow {
    /// Create a limiter with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: None,
            suppressed: 0,
        }
    }

    /// Record one failure. Returns `Some(suppressed_since_last_log)` when the
    /// caller should log it, `None` when it falls inside the current window.
    pub fn record(&mut self, now: Instant) -> Option<u32> {
        let open = self
            .last_logged
            .is_none_or(|last| now.saturating_duration_since(last) >= self.window);
        if open {
            self.last_logged = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    const INTERVAL: Duration = Duration::from_millis(1_000);

    fn snap(x: f32) -> EntityState {
        EntityState::at(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_offline_offer_is_buffered() {
        let mut throttle = OutboundThrottle::new(INTERVAL);
        let t0 = Instant::now();

        assert!(throttle.offer(snap(1.0), t0, false).is_none());
        assert!(throttle.has_pending());
        assert_eq!(throttle.latest().unwrap().position.x, 1.0);
    }

    #[test]
    fn test_first_offer_on_idle_link_sends() {
        let mut throttle = OutboundThrottle::new(INTERVAL);
        let sent = throttle.offer(snap(1.0), Instant::now(), true);
        assert_eq!(sent.unwrap().position.x, 1.0);
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_burst_after_connect_sends_only_the_last() {
        let mut throttle = OutboundThrottle::new(INTERVAL);
        let t0 = Instant::now();
        assert!(throttle.on_connected(t0).is_none());

        for (i, x) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            let at = t0 + Duration::from_millis(1 + 2 * i as u64);
            assert!(throttle.offer(snap(x), at, true).is_none());
        }

        assert!(throttle.poll(t0 + Duration::from_millis(999), true).is_none());
        let sent = throttle.poll(t0 + INTERVAL, true).unwrap();
        assert_eq!(sent.position.x, 3.0);
        assert!(throttle.poll(t0 + INTERVAL * 3, true).is_none());
    }

    #[test]
    fn test_interval_is_enforced_between_sends() {
        let mut throttle = OutboundThrottle::new(INTERVAL);
        let t0 = Instant::now();
        assert!(throttle.offer(snap(1.0), t0, true).is_some());

        let early = t0 + Duration::from_millis(400);
        assert!(throttle.offer(snap(2.0), early, true).is_none());
        let sent = throttle.offer(snap(3.0), t0 + INTERVAL, true).unwrap();
        assert_eq!(sent.position.x, 3.0);
    }

    #[test]
    fn test_connect_flushes_buffer() {
        let mut throttle = OutboundThrottle::new(INTERVAL);
        let t0 = Instant::now();
        throttle.offer(snap(1.0), t0, false);
        throttle.offer(snap(2.0), t0, false);

        let flushed = throttle.on_connected(t0 + Duration::from_millis(5)).unwrap();
        assert_eq!(flushed.position.x, 2.0);
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut throttle = OutboundThrottle::new(INTERVAL);
        throttle.offer(snap(1.0), Instant::now(), false);
        throttle.clear();
        assert!(throttle.latest().is_none());
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_error_window_limits_logging() {
        let mut window = ErrorWindow::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert_eq!(window.record(t0), Some(0));
        assert_eq!(window.record(t0 + Duration::from_secs(1)), None);
        assert_eq!(window.record(t0 + Duration::from_secs(4)), None);
        assert_eq!(window.record(t0 + Duration::from_secs(5)), Some(2));
        assert_eq!(window.record(t0 + Duration::from_secs(6)), None);
    }
}
