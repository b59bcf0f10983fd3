//! Connection state machine with bounded exponential backoff.
//!
//! [`ConnectionState::next`] is the complete transition table. The
//! [`ConnectionController`] layers the retry policy on top: an involuntary
//! drop to `Disconnected` schedules a retry after
//! `min(initial_delay * 2^attempts, max_delay)` until `max_attempts` is
//! reached. Retries are deadlines, fired by [`ConnectionController::poll_retry`]
//! from the owner's tick, so cancelling one is just clearing the handle.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Configuration for automatic reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1 s.
    pub initial_delay: Duration,
    /// Cap on the delay between retries. Default: 30 s.
    pub max_delay: Duration,
    /// Retries before giving up until the next explicit connect. Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl From<&tether_config::ReconnectSettings> for ReconnectConfig {
    fn from(settings: &tether_config::ReconnectSettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

/// Tracks the retry count and computes the next backoff delay.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectState {
    /// Create a new state from the given config.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.config
            .initial_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    /// Compute the next delay and advance the attempt counter.
    /// Returns `None` once max attempts have been used.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// Reset after a successful connect or an explicit connect/teardown.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Retries used so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured maximum.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

/// Transport connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// Waiting for the transport to report the outcome of a connect.
    Connecting,
    /// Link is up.
    Connected,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The owner asked to connect.
    ConnectRequested,
    /// A scheduled retry came due.
    RetryFired,
    /// The transport reported success.
    ConnectSucceeded,
    /// The transport reported failure.
    ConnectFailed,
    /// The transport dropped an established link.
    TransportDisconnected,
    /// The owner tore the session down.
    Teardown,
}

impl ConnectionState {
    /// Successor state for `event`. Events that make no sense in the current
    /// state (a late success after teardown, say) leave it unchanged.
    pub fn next(self, event: ConnectionEvent) -> ConnectionState {
        use ConnectionEvent as E;
        use ConnectionState as S;
        match (self, event) {
            (_, E::Teardown) => S::Disconnected,
            (S::Disconnected, E::ConnectRequested | E::RetryFired) => S::Connecting,
            (S::Disconnected, E::ConnectSucceeded | E::ConnectFailed | E::TransportDisconnected) => {
                S::Disconnected
            }
            (S::Connecting, E::ConnectSucceeded) => S::Connected,
            (S::Connecting, E::ConnectFailed | E::TransportDisconnected) => S::Disconnected,
            (S::Connecting, E::ConnectRequested | E::RetryFired) => S::Connecting,
            (S::Connected, E::TransportDisconnected) => S::Disconnected,
            (S::Connected, E::ConnectRequested | E::RetryFired)
            | (S::Connected, E::ConnectSucceeded | E::ConnectFailed) => S::Connected,
        }
    }
}

/// A scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    /// When the retry fires.
    pub due: Instant,
    /// Which retry this is (1-based).
    pub attempt: u32,
}

/// What the retry policy decided after an involuntary disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// A retry was scheduled.
    Scheduled {
        /// 1-based retry number.
        attempt: u32,
        /// Delay until it fires.
        delay: Duration,
    },
    /// The retry budget is spent; waiting for an explicit connect.
    Exhausted,
    /// The event did not cause a transition (stale or duplicate).
    Ignored,
}

/// Connection state plus retry bookkeeping.
#[derive(Debug)]
pub struct ConnectionController {
    state: ConnectionState,
    backoff: ReconnectState,
    pending: Option<PendingRetry>,
}

impl ConnectionController {
    /// Start `Disconnected` with no retry pending.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff: ReconnectState::new(config),
            pending: None,
        }
    }

    /// Explicit connect. Resets the retry budget and cancels any pending
    /// retry. Returns `true` if the caller should invoke the transport.
    pub fn request_connect(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.backoff.reset();
        self.pending = None;
        self.apply(ConnectionEvent::ConnectRequested);
        true
    }

    /// Fire the pending retry if it is due. Returns `true` if the caller
    /// should invoke the transport.
    pub fn poll_retry(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(retry) if now >= retry.due => {
                self.pending = None;
                tracing::info!(attempt = retry.attempt, "Reconnection attempt firing");
                self.apply(ConnectionEvent::RetryFired);
                true
            }
            _ => false,
        }
    }

    /// Transport reported success. Returns `true` on the transition into
    /// `Connected`.
    pub fn on_connect_success(&mut self) -> bool {
        let previous = self.apply(ConnectionEvent::ConnectSucceeded);
        if previous != ConnectionState::Connecting {
            return false;
        }
        if self.backoff.attempts() > 0 {
            tracing::info!("Reconnected after {} attempts", self.backoff.attempts());
        }
        self.backoff.reset();
        true
    }

    /// Transport reported a failed connect.
    pub fn on_connect_failure(&mut self, now: Instant) -> RetryDecision {
        self.involuntary(ConnectionEvent::ConnectFailed, now)
    }

    /// Transport dropped an established link.
    pub fn on_transport_disconnect(&mut self, now: Instant) -> RetryDecision {
        self.involuntary(ConnectionEvent::TransportDisconnected, now)
    }

    /// Owner teardown: cancel the pending retry, reset the budget and return
    /// to `Disconnected`.
    pub fn teardown(&mut self) {
        self.pending = None;
        self.backoff.reset();
        self.apply(ConnectionEvent::Teardown);
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Retries used since the last success or explicit connect.
    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// The scheduled retry, if any.
    pub fn pending_retry(&self) -> Option<PendingRetry> {
        self.pending
    }

    /// `true` when the link is up.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Apply `event`, returning the previous state.
    fn apply(&mut self, event: ConnectionEvent) -> ConnectionState {
        let previous = self.state;
        self.state = previous.next(event);
        if previous != self.state {
            tracing::debug!(from = ?previous, to = ?self.state, ?event, "Connection state changed");
        }
        previous
    }

    fn involuntary(&mut self, event: ConnectionEvent, now: Instant) -> RetryDecision {
        let previous = self.apply(event);
        if previous == ConnectionState::Disconnected {
            return RetryDecision::Ignored;
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempts();
                self.pending = Some(PendingRetry {
                    due: now + delay,
                    attempt,
                });
                tracing::info!("Reconnection attempt {} in {:?}", attempt, delay);
                RetryDecision::Scheduled { attempt, delay }
            }
            None => {
                tracing::warn!(
                    "Giving up after {} reconnection attempts",
                    self.backoff.attempts()
                );
                RetryDecision::Exhausted
            }
        }
    }
}
