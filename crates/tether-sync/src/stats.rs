//! Manager statistics for debug overlays.

use serde::Serialize;

use crate::reconnection::ConnectionState;

/// Point-in-time view of a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Current connection state.
    pub connection_state: ConnectionState,
    /// Automatic retries used since the last success or explicit connect.
    pub reconnect_attempts: u32,
    /// Time since the last inbound message, `None` if nothing arrived yet.
    pub ms_since_last_receive: Option<u64>,
    /// Entities currently in the store.
    pub tracked_entity_count: usize,
    /// Listeners registered across all notification kinds.
    pub listener_count: usize,
    /// Messages handed to the transport successfully.
    pub messages_sent: u64,
    /// Valid messages received, self-echo included.
    pub messages_received: u64,
    /// Malformed or rejected inbound messages.
    pub messages_dropped: u64,
    /// Broadcasts the transport rejected.
    pub send_failures: u64,
}

/// Lifetime counters, reset only on teardown.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
    pub send_failures: u64,
}
