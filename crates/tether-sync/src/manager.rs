//! The synchronization manager: one instance per active session.
//!
//! [`SyncManager`] owns the connection state machine, the remote entity store,
//! the outbound throttle and the listener registry. It is driven from a single
//! context:
//!
//! - the host's fixed tick calls [`SyncManager::advance`], which drains
//!   transport events, fires due retries, flushes throttled state, blends every
//!   remote entity, evicts silent ones and notifies listeners;
//! - the game calls [`SyncManager::send_state`] as often as it likes and the
//!   one-shot session senders when a round changes phase.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::callbacks::{CallbackRegistry, ItemEvent, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::interpolation;
use crate::messages::{
    CodecError, EntityState, ItemChange, ItemState, ItemsFullSync, Message, Payload, SessionEnd,
    SessionStart, TimerSync, decode_message, encode_message,
};
use crate::monitor::DisconnectMonitor;
use crate::reconnection::{ConnectionController, ConnectionState, RetryDecision};
use crate::stats::{Counters, SyncStats};
use crate::store::{ApplyOutcome, EntityStore, RemoteEntity};
use crate::throttle::{ErrorWindow, OutboundThrottle};
use crate::transport::{Transport, TransportError, TransportEvent, event_channel};

/// Why a one-shot session-control send did not go out. Retrying is up to the
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The message failed validation.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The transport rejected the broadcast.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Keeps remote participants smooth and eventually consistent over a
/// throttled, unreliable broadcast transport.
pub struct SyncManager<T: Transport, C: Clock = SystemClock> {
    config: SyncConfig,
    transport: T,
    clock: C,
    connection: ConnectionController,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    store: EntityStore,
    monitor: DisconnectMonitor,
    throttle: OutboundThrottle,
    send_errors: ErrorWindow,
    callbacks: CallbackRegistry,
    last_receive: Option<Instant>,
    counters: Counters,
}

impl<T: Transport> SyncManager<T, SystemClock> {
    /// Create a manager on the system clock. Starts disconnected.
    pub fn new(config: SyncConfig, transport: T) -> Self {
        Self::with_clock(config, transport, SystemClock)
    }
}

impl<T: Transport, C: Clock> SyncManager<T, C> {
    /// Create a manager reading time from `clock`. Starts disconnected.
    pub fn with_clock(config: SyncConfig, transport: T, clock: C) -> Self {
        if config.effective_resource_max() != config.resource_max {
            tracing::warn!(
                resource_max = config.resource_max,
                fallback = config.effective_resource_max(),
                "Unusable resource bound, using fallback"
            );
        }
        Self {
            connection: ConnectionController::new(config.reconnect.clone()),
            monitor: DisconnectMonitor::new(config.disconnect_timeout),
            throttle: OutboundThrottle::new(config.min_send_interval),
            send_errors: ErrorWindow::new(config.send_error_window),
            events: None,
            store: EntityStore::new(),
            callbacks: CallbackRegistry::new(),
            last_receive: None,
            counters: Counters::default(),
            config,
            transport,
            clock,
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Explicitly connect. Resets the retry budget. No-op while connecting or
    /// connected.
    pub fn connect(&mut self) {
        if self.connection.request_connect() {
            tracing::info!(channel = %self.config.channel_id, "Connecting");
            self.open_connection();
        }
    }

    /// Tear the session down: close the transport, cancel any pending retry,
    /// clear the store and the outbound buffer, reset counters. Idempotent.
    pub fn disconnect(&mut self) {
        if self.events.take().is_some() {
            self.transport.disconnect();
        }
        let was = self.connection.state();
        self.connection.teardown();
        self.store.clear();
        self.throttle.clear();
        self.last_receive = None;
        self.counters = Counters::default();
        if was != ConnectionState::Disconnected {
            tracing::info!(channel = %self.config.channel_id, "Disconnected by owner");
        }
    }

    fn open_connection(&mut self) {
        // A fresh channel per attempt: events from an abandoned attempt land
        // in a dropped receiver.
        let (sink, rx) = event_channel();
        self.events = Some(rx);
        if let Err(e) = self.transport.connect(&self.config.channel_id, sink) {
            self.handle_connect_failed(&e.to_string());
        }
    }

    fn handle_connected(&mut self) {
        if !self.connection.on_connect_success() {
            return;
        }
        tracing::info!(channel = %self.config.channel_id, "Connected");
        let now = self.clock.now();
        if let Some(snapshot) = self.throttle.on_connected(now) {
            self.transmit_state(snapshot);
        }
        self.callbacks.notify_connect();
    }

    fn handle_connect_failed(&mut self, reason: &str) {
        tracing::warn!(channel = %self.config.channel_id, "Connect failed: {}", reason);
        self.events = None;
        let decision = self.connection.on_connect_failure(self.clock.now());
        self.log_retry(decision);
    }

    fn handle_transport_disconnect(&mut self, reason: &str) {
        self.events = None;
        let decision = self.connection.on_transport_disconnect(self.clock.now());
        if decision != RetryDecision::Ignored {
            tracing::warn!(channel = %self.config.channel_id, "Connection lost: {}", reason);
        }
        self.log_retry(decision);
    }

    fn log_retry(&self, decision: RetryDecision) {
        if let RetryDecision::Exhausted = decision {
            tracing::warn!(
                channel = %self.config.channel_id,
                "Automatic reconnection stopped; call connect() to try again"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Drain pending transport events and fire a due retry, without blending.
    pub fn pump(&mut self) {
        loop {
            let event = match self.events.as_mut().map(|rx| rx.try_recv()) {
                Some(Ok(event)) => event,
                _ => break,
            };
            match event {
                TransportEvent::Connected => self.handle_connected(),
                TransportEvent::ConnectFailed(reason) => self.handle_connect_failed(&reason),
                TransportEvent::Disconnected(reason) => self.handle_transport_disconnect(&reason),
                TransportEvent::Message(payload) => self.receive(&payload),
            }
        }

        if self.connection.poll_retry(self.clock.now()) {
            self.open_connection();
        }
    }

    /// One render tick. Blend progress is measured against the clock, so
    /// `_frame_delta` only keeps the call shape of a per-frame update.
    pub fn advance(&mut self, _frame_delta: Duration) {
        self.pump();

        let now = self.clock.now();
        if let Some(snapshot) = self.throttle.poll(now, self.connection.is_connected()) {
            self.transmit_state(snapshot);
        }

        interpolation::advance_all(&mut self.store, now, &self.config.interpolation());

        for id in self.monitor.sweep(&mut self.store, now) {
            self.callbacks.notify_disconnect(&id);
        }

        for entity in self.store.iter() {
            self.callbacks.notify_update(entity);
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Decode and route one wire payload. Malformed payloads are dropped.
    pub fn receive(&mut self, payload: &[u8]) {
        match decode_message(payload) {
            Ok(msg) => self.route(msg),
            Err(e) => {
                self.counters.dropped += 1;
                tracing::debug!("Dropping malformed message: {}", e);
            }
        }
    }

    /// Route an already-decoded message, for in-process transports.
    pub fn receive_message(&mut self, msg: Message) {
        if let Err(e) = msg.validate() {
            self.counters.dropped += 1;
            tracing::debug!("Dropping invalid message from {}: {}", msg.origin_id, e);
            return;
        }
        self.route(msg);
    }

    fn route(&mut self, msg: Message) {
        let now = self.clock.now();
        self.counters.received += 1;
        self.last_receive = Some(now);

        if msg.origin_id == self.config.local_id {
            tracing::trace!(kind = ?msg.kind(), "Ignoring self-echo");
            return;
        }

        let Message {
            origin_id,
            timestamp,
            payload,
        } = msg;

        match payload {
            Payload::EntityUpdate(state) => {
                let outcome = self.store.apply(
                    &origin_id,
                    timestamp,
                    &state,
                    now,
                    self.config.update_policy(),
                );
                match outcome {
                    ApplyOutcome::Created => {
                        tracing::debug!(entity = %origin_id, "Tracking new remote entity");
                    }
                    ApplyOutcome::Retargeted => {}
                    ApplyOutcome::OutOfOrder => {
                        self.counters.dropped += 1;
                        tracing::debug!(entity = %origin_id, timestamp, "Dropping out-of-order update");
                    }
                }
            }
            Payload::SessionStart(start) => {
                self.callbacks.notify_session_start(&start);
            }
            Payload::SessionEnd(end) => {
                self.callbacks.notify_session_end(&end);
            }
            Payload::TimerSync(sync) => {
                self.callbacks.notify_timer_sync(&sync);
            }
            Payload::ItemEvent(change) => {
                self.callbacks.notify_item(&ItemEvent::Change(change));
            }
            Payload::ItemsFullSync(sync) => {
                self.callbacks.notify_item(&ItemEvent::FullSync(sync.items));
            }
        }
    }

    /// Pull the authoritative session state from a polling transport and feed
    /// it through the inbound path. Returns how many payloads were processed.
    pub fn poll_session_state(&mut self) -> Result<usize, TransportError> {
        if !self.connection.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let payloads = self
            .transport
            .fetch_session_state(&self.config.channel_id)?;
        for payload in &payloads {
            self.receive(payload);
        }
        Ok(payloads.len())
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Offer the local entity's latest state. Sent at most once per
    /// `min_send_interval`; otherwise buffered, replacing any unsent snapshot,
    /// and released by a later [`advance`](Self::advance). Never fails;
    /// transport errors are logged.
    pub fn send_state(&mut self, snapshot: EntityState) {
        let now = self.clock.now();
        if let Some(snapshot) = self
            .throttle
            .offer(snapshot, now, self.connection.is_connected())
        {
            self.transmit_state(snapshot);
        }
    }

    fn transmit_state(&mut self, snapshot: EntityState) {
        let msg = self.envelope(Payload::EntityUpdate(snapshot));
        if let Err(e) = self.transmit(&msg) {
            self.note_send_failure(&e);
        }
    }

    /// Announce a round start.
    pub fn send_session_start(&mut self, start: SessionStart) -> Result<(), SendError> {
        self.send_control(Payload::SessionStart(start))
    }

    /// Announce a round end.
    pub fn send_session_end(&mut self, end: SessionEnd) -> Result<(), SendError> {
        self.send_control(Payload::SessionEnd(end))
    }

    /// Broadcast the authoritative round timer.
    pub fn send_timer_sync(&mut self, sync: TimerSync) -> Result<(), SendError> {
        self.send_control(Payload::TimerSync(sync))
    }

    /// Broadcast a single item change.
    pub fn send_item_event(&mut self, change: ItemChange) -> Result<(), SendError> {
        self.send_control(Payload::ItemEvent(change))
    }

    /// Broadcast the complete item list.
    pub fn send_items_full_sync(&mut self, items: Vec<ItemState>) -> Result<(), SendError> {
        self.send_control(Payload::ItemsFullSync(ItemsFullSync { items }))
    }

    /// Session-control messages skip the throttle and are handed to the
    /// transport even while the push link is down; the transport decides.
    fn send_control(&mut self, payload: Payload) -> Result<(), SendError> {
        let msg = self.envelope(payload);
        let result = self.transmit(&msg);
        if let Err(e) = &result {
            self.note_send_failure(e);
        }
        result
    }

    fn envelope(&self, payload: Payload) -> Message {
        Message::new(self.config.local_id.clone(), self.clock.unix_ms(), payload)
    }

    fn transmit(&mut self, msg: &Message) -> Result<(), SendError> {
        let bytes = encode_message(msg)?;
        if let Err(e) = self.transport.broadcast(&self.config.channel_id, &bytes) {
            self.counters.send_failures += 1;
            return Err(e.into());
        }
        self.counters.sent += 1;
        Ok(())
    }

    fn note_send_failure(&mut self, error: &SendError) {
        if let Some(suppressed) = self.send_errors.record(self.clock.now()) {
            tracing::warn!(
                channel = %self.config.channel_id,
                suppressed,
                "Send failed: {}",
                error
            );
        }
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Currently displayed remote entities, in no particular order.
    pub fn remote_entities(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.store.iter()
    }

    /// One remote entity by id.
    pub fn remote_entity(&self, id: &str) -> Option<&RemoteEntity> {
        self.store.get(id)
    }

    /// Insert or update an entity simulated locally (a host-run bot, say).
    /// It is displayed like any remote entity but never evicted for silence.
    pub fn track_local_entity(&mut self, id: &str, state: EntityState) {
        if id == self.config.local_id {
            return;
        }
        let now = self.clock.now();
        let timestamp = self.clock.unix_ms();
        self.store
            .apply_local(id, timestamp, &state, now, self.config.update_policy());
    }

    /// Update a locally driven entity previously added with
    /// [`track_local_entity`](Self::track_local_entity). Returns `false` if it
    /// is not tracked as local.
    pub fn update_local_entity(&mut self, id: &str, state: EntityState) -> bool {
        if !self.store.get(id).is_some_and(|e| e.exempt) {
            return false;
        }
        self.track_local_entity(id, state);
        true
    }

    /// Drop an entity without notifying disconnect listeners.
    pub fn remove_entity(&mut self, id: &str) -> Option<RemoteEntity> {
        self.store.remove(id)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Per-tick blended state of each entity.
    pub fn on_update(&mut self, listener: impl FnMut(&RemoteEntity) + 'static) -> Subscription {
        self.callbacks.on_update(listener)
    }

    /// Id of each entity evicted for silence, once per eviction.
    pub fn on_disconnect(&mut self, listener: impl FnMut(&str) + 'static) -> Subscription {
        self.callbacks.on_disconnect(listener)
    }

    /// Every successful (re)connect.
    pub fn on_connect(&mut self, listener: impl FnMut() + 'static) -> Subscription {
        self.callbacks.on_connect(listener)
    }

    /// Remote session-start messages.
    pub fn on_session_start(
        &mut self,
        listener: impl FnMut(&SessionStart) + 'static,
    ) -> Subscription {
        self.callbacks.on_session_start(listener)
    }

    /// Remote session-end messages.
    pub fn on_session_end(&mut self, listener: impl FnMut(&SessionEnd) + 'static) -> Subscription {
        self.callbacks.on_session_end(listener)
    }

    /// Remote timer-sync messages.
    pub fn on_timer_sync(&mut self, listener: impl FnMut(&TimerSync) + 'static) -> Subscription {
        self.callbacks.on_timer_sync(listener)
    }

    /// Remote item-event and items-full-sync messages.
    pub fn on_item_event(&mut self, listener: impl FnMut(&ItemEvent) + 'static) -> Subscription {
        self.callbacks.on_item_event(listener)
    }

    /// Remove a listener registered through any `on_*` method.
    pub fn unsubscribe(&mut self, sub: Subscription) -> bool {
        self.callbacks.unsubscribe(sub)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Snapshot of connection and traffic state.
    pub fn stats(&self) -> SyncStats {
        let now = self.clock.now();
        SyncStats {
            connection_state: self.connection.state(),
            reconnect_attempts: self.connection.attempts(),
            ms_since_last_receive: self
                .last_receive
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            tracked_entity_count: self.store.len(),
            listener_count: self.callbacks.len(),
            messages_sent: self.counters.sent,
            messages_received: self.counters.received,
            messages_dropped: self.counters.dropped,
            send_failures: self.counters.send_failures,
        }
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// `true` if an automatic retry is scheduled.
    pub fn has_pending_retry(&self) -> bool {
        self.connection.pending_retry().is_some()
    }

    /// Latest snapshot passed to [`send_state`](Self::send_state).
    pub fn outbound_state(&self) -> Option<&EntityState> {
        self.throttle.latest()
    }

    /// The manager's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The transport, for inspection.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport, C: Clock> Drop for SyncManager<T, C> {
    fn drop(&mut self) {
        if self.events.take().is_some() {
            self.transport.disconnect();
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
