//! Test doubles for driving a [`SyncManager`](crate::SyncManager) without a
//! network.

use std::cell::RefCell;
use std::rc::Rc;

pub use crate::clock::ManualClock;
use crate::messages::{Message, decode_message, encode_message};
use crate::transport::{EventSink, Transport, TransportError};

#[derive(Debug, Default)]
struct Recording {
    sink: Option<EventSink>,
    connect_calls: u32,
    disconnect_calls: u32,
    sent: Vec<Vec<u8>>,
    auto_connect: bool,
    refuse_connect: Option<String>,
    fail_sends: bool,
    session_state: Option<Vec<Vec<u8>>>,
}

/// A transport that records every call and lets the test script connection
/// outcomes and inbound traffic.
///
/// Clones share state: hand one to the manager and keep one to drive it.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Rc<RefCell<Recording>>,
}

impl RecordingTransport {
    /// A transport that leaves every connect pending until
    /// [`complete_connect`](Self::complete_connect) or
    /// [`fail_connect`](Self::fail_connect).
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that reports success as soon as `connect` is called.
    pub fn auto_connecting() -> Self {
        let transport = Self::new();
        transport.inner.borrow_mut().auto_connect = true;
        transport
    }

    /// Report success for the open connect attempt.
    pub fn complete_connect(&self) -> bool {
        self.with_sink(|sink| sink.connected())
    }

    /// Report failure for the open connect attempt.
    pub fn fail_connect(&self, reason: &str) -> bool {
        self.with_sink(|sink| sink.connect_failed(reason))
    }

    /// Drop an established connection from the remote side.
    pub fn drop_connection(&self, reason: &str) -> bool {
        self.with_sink(|sink| sink.disconnected(reason))
    }

    /// Deliver `msg` as if another participant had broadcast it.
    pub fn deliver(&self, msg: &Message) -> bool {
        match encode_message(msg) {
            Ok(bytes) => self.deliver_raw(bytes),
            Err(_) => false,
        }
    }

    /// Deliver raw bytes, valid or not.
    pub fn deliver_raw(&self, payload: Vec<u8>) -> bool {
        self.with_sink(|sink| sink.message(payload))
    }

    /// Make `connect` return an error synchronously (or stop doing so).
    pub fn refuse_connect(&self, reason: Option<&str>) {
        self.inner.borrow_mut().refuse_connect = reason.map(str::to_string);
    }

    /// Make every broadcast fail (or stop doing so).
    pub fn fail_sends(&self, fail: bool) {
        self.inner.borrow_mut().fail_sends = fail;
    }

    /// Serve `messages` from `fetch_session_state`.
    pub fn set_session_state(&self, messages: &[Message]) {
        let payloads = messages
            .iter()
            .filter_map(|msg| encode_message(msg).ok())
            .collect();
        self.inner.borrow_mut().session_state = Some(payloads);
    }

    /// Every successfully broadcast message, decoded.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.inner
            .borrow()
            .sent
            .iter()
            .filter_map(|bytes| decode_message(bytes).ok())
            .collect()
    }

    /// Number of successful broadcasts.
    pub fn sent_count(&self) -> usize {
        self.inner.borrow().sent.len()
    }

    /// Forget recorded broadcasts.
    pub fn clear_sent(&self) {
        self.inner.borrow_mut().sent.clear();
    }

    /// Times `connect` was called.
    pub fn connect_calls(&self) -> u32 {
        self.inner.borrow().connect_calls
    }

    /// Times `disconnect` was called.
    pub fn disconnect_calls(&self) -> u32 {
        self.inner.borrow().disconnect_calls
    }

    /// `true` while the manager still listens to the latest connection.
    pub fn is_listening(&self) -> bool {
        self.inner
            .borrow()
            .sink
            .as_ref()
            .is_some_and(EventSink::is_open)
    }

    fn with_sink(&self, f: impl FnOnce(&EventSink) -> bool) -> bool {
        // Clone out so the borrow is released before the sink is used.
        let sink = self.inner.borrow().sink.clone();
        sink.as_ref().is_some_and(f)
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, _channel_id: &str, events: EventSink) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        inner.connect_calls += 1;
        if let Some(reason) = inner.refuse_connect.clone() {
            inner.sink = None;
            return Err(TransportError::ConnectFailed(reason));
        }
        if inner.auto_connect {
            events.connected();
        }
        inner.sink = Some(events);
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.disconnect_calls += 1;
        inner.sink = None;
    }

    fn broadcast(&mut self, _channel_id: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_sends {
            return Err(TransportError::SendFailed("scripted failure".to_string()));
        }
        inner.sent.push(payload.to_vec());
        Ok(())
    }

    fn fetch_session_state(&mut self, _channel_id: &str) -> Result<Vec<Vec<u8>>, TransportError> {
        self.inner
            .borrow()
            .session_state
            .clone()
            .ok_or(TransportError::Unsupported)
    }
}
