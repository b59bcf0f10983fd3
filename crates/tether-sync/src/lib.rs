//! Real-time entity synchronization over an unreliable broadcast channel:
//! message codec, outbound throttling, interpolation and dead reckoning,
//! silence detection, and reconnection with bounded backoff.

pub mod callbacks;
pub mod clock;
pub mod config;
pub mod interpolation;
pub mod manager;
pub mod messages;
pub mod monitor;
pub mod reconnection;
pub mod stats;
pub mod store;
pub mod testing;
pub mod throttle;
pub mod transport;

pub use callbacks::{CallbackRegistry, ItemEvent, Subscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use interpolation::InterpolationConfig;
pub use manager::{SendError, SyncManager};
pub use messages::{
    Abilities, CodecError, EntityState, ItemAction, ItemChange, ItemState, ItemsFullSync, Message,
    MessageKind, Orientation, Payload, SessionEnd, SessionStart, TimerSync, decode_message,
    encode_message,
};
pub use monitor::DisconnectMonitor;
pub use reconnection::{
    ConnectionController, ConnectionEvent, ConnectionState, PendingRetry, ReconnectConfig,
    ReconnectState, RetryDecision,
};
pub use stats::SyncStats;
pub use store::{AbilityFlags, ApplyOutcome, EntityStore, RemoteEntity, Transform, UpdatePolicy};
pub use throttle::{ErrorWindow, OutboundThrottle};
pub use transport::{EventSink, Transport, TransportError, TransportEvent};
