//! Runtime configuration of a [`SyncManager`](crate::SyncManager).

use std::time::Duration;

use crate::interpolation::InterpolationConfig;
use crate::reconnection::ReconnectConfig;
use crate::store::UpdatePolicy;

const DEFAULT_RESOURCE_MAX: f32 = 100.0;

/// Everything a manager needs to know about its session and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Local participant id; inbound messages carrying it are self-echo.
    pub local_id: String,
    /// Broadcast channel to join.
    pub channel_id: String,
    /// Minimum spacing between outbound state sends. Default: 100 ms.
    pub min_send_interval: Duration,
    /// Blend window for remote entities. Default: 100 ms.
    pub interpolation_window: Duration,
    /// Dead-reckon past the blend window. Default: on.
    pub prediction_enabled: bool,
    /// Silence before a remote entity is evicted. Default: 5 s.
    pub disconnect_timeout: Duration,
    /// At most one send-failure log per window. Default: 5 s.
    pub send_error_window: Duration,
    /// Drop entity updates older than the last accepted one. Default: off.
    pub reject_out_of_order: bool,
    /// Resource gauge upper bound. Default: 100.
    pub resource_max: f32,
    /// Automatic reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl SyncConfig {
    /// Defaults for `local_id` on `channel_id`.
    pub fn new(local_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            channel_id: channel_id.into(),
            min_send_interval: Duration::from_millis(100),
            interpolation_window: Duration::from_millis(100),
            prediction_enabled: true,
            disconnect_timeout: Duration::from_secs(5),
            send_error_window: Duration::from_secs(5),
            reject_out_of_order: false,
            resource_max: DEFAULT_RESOURCE_MAX,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub(crate) fn interpolation(&self) -> InterpolationConfig {
        InterpolationConfig {
            window: self.interpolation_window,
            prediction: self.prediction_enabled,
        }
    }

    pub(crate) fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy {
            reject_out_of_order: self.reject_out_of_order,
            resource_max: self.effective_resource_max(),
        }
    }

    /// `resource_max` if it is a usable bound, otherwise the default.
    pub fn effective_resource_max(&self) -> f32 {
        if self.resource_max.is_finite() && self.resource_max > 0.0 {
            self.resource_max
        } else {
            DEFAULT_RESOURCE_MAX
        }
    }
}

impl From<&tether_config::Config> for SyncConfig {
    fn from(config: &tether_config::Config) -> Self {
        let sync = &config.sync;
        Self {
            local_id: config.session.local_id.clone(),
            channel_id: config.session.channel_id.clone(),
            min_send_interval: Duration::from_millis(sync.min_send_interval_ms),
            interpolation_window: Duration::from_millis(sync.interpolation_window_ms),
            prediction_enabled: sync.prediction_enabled,
            disconnect_timeout: Duration::from_millis(sync.disconnect_timeout_ms),
            send_error_window: Duration::from_millis(sync.send_error_window_ms),
            reject_out_of_order: sync.reject_out_of_order,
            resource_max: sync.resource_max,
            reconnect: ReconnectConfig::from(&config.reconnect),
        }
    }
}
