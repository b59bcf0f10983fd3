//! The transport seam.
//!
//! A [`Transport`] carries opaque payloads over a broadcast channel. It reports
//! connection outcomes and inbound payloads through the [`EventSink`] it is
//! handed on every connect; the manager drains those events on its own tick,
//! so transport callbacks never re-enter the manager.

use tokio::sync::mpsc;

/// Something that happened on the transport, delivered between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection attempt succeeded.
    Connected,
    /// The connection attempt failed.
    ConnectFailed(String),
    /// An established connection was lost.
    Disconnected(String),
    /// A payload arrived on the channel.
    Message(Vec<u8>),
}

/// Callback bundle handed to [`Transport::connect`].
///
/// Every method returns `false` once the manager has stopped listening to this
/// connection (after teardown or a newer connect), so a transport can stop
/// pushing into a dead attempt.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    /// Report a successful connect.
    pub fn connected(&self) -> bool {
        self.push(TransportEvent::Connected)
    }

    /// Report a failed connect.
    pub fn connect_failed(&self, reason: impl Into<String>) -> bool {
        self.push(TransportEvent::ConnectFailed(reason.into()))
    }

    /// Report that an established connection dropped.
    pub fn disconnected(&self, reason: impl Into<String>) -> bool {
        self.push(TransportEvent::Disconnected(reason.into()))
    }

    /// Deliver an inbound payload.
    pub fn message(&self, payload: Vec<u8>) -> bool {
        self.push(TransportEvent::Message(payload))
    }

    /// `true` while the manager still listens to this connection.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn push(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Create a sink and the receiver the manager drains each tick.
pub(crate) fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<TransportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

/// Errors a transport can report synchronously.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be started.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// The broadcast call was rejected.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// No connection is open.
    #[error("not connected")]
    NotConnected,
    /// The transport does not implement this optional call.
    #[error("operation not supported by this transport")]
    Unsupported,
}

/// A push (and optionally pull) broadcast transport.
pub trait Transport {
    /// Start connecting to `channel_id`. The outcome is reported through
    /// `events`, either before returning or later. An `Err` is treated the
    /// same as a reported connect failure.
    fn connect(&mut self, channel_id: &str, events: EventSink) -> Result<(), TransportError>;

    /// Close the current connection, if any. Must be safe to call repeatedly.
    fn disconnect(&mut self);

    /// Fire-and-forget broadcast of `payload` to everyone on `channel_id`.
    fn broadcast(&mut self, channel_id: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Pull the authoritative session state as a batch of wire payloads, for
    /// transports that prefer polling over push.
    fn fetch_session_state(&mut self, channel_id: &str) -> Result<Vec<Vec<u8>>, TransportError> {
        let _ = channel_id;
        Err(TransportError::Unsupported)
    }
}
