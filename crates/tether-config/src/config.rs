//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Identity of the local participant and the channel it joins.
    pub session: SessionConfig,
    /// Throttling, interpolation and disconnect detection.
    pub sync: SyncSettings,
    /// Automatic reconnection policy.
    pub reconnect: ReconnectSettings,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Loopback demo settings.
    pub demo: DemoConfig,
}

/// Local participant identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Id stamped on every outbound message. Inbound messages carrying this
    /// id are treated as self-echo.
    pub local_id: String,
    /// Broadcast channel (session id) to join.
    pub channel_id: String,
}

/// Synchronization timing knobs, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Minimum spacing between two outbound state sends.
    pub min_send_interval_ms: u64,
    /// Duration over which a remote entity blends toward a new target.
    pub interpolation_window_ms: u64,
    /// Keep moving remote entities by their last velocity once the blend ends.
    pub prediction_enabled: bool,
    /// Silence after which a remote entity is evicted.
    pub disconnect_timeout_ms: u64,
    /// At most one send-failure log line per window.
    pub send_error_window_ms: u64,
    /// Drop entity updates older than the last accepted one for that entity.
    pub reject_out_of_order: bool,
    /// Upper bound of the per-entity resource gauge.
    pub resource_max: f32,
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Delay before the first automatic retry.
    pub base_delay_ms: u64,
    /// Cap applied to the exponential delay.
    pub max_delay_ms: u64,
    /// Automatic retries before giving up until the next explicit connect.
    pub max_attempts: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the config in debug builds.
    pub log_to_file: bool,
}

/// Settings for the loopback demo binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Render tick rate (Hz).
    pub tick_rate_hz: u32,
    /// Simulated run length in seconds.
    pub duration_s: u32,
    /// Fraction of broadcasts the loopback transport drops (0.0 - 1.0).
    pub packet_loss: f64,
    /// Seed for the simulated network.
    pub seed: u64,
}

// --- Default implementations ---

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_id: "player-1".to_string(),
            channel_id: "lobby".to_string(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_send_interval_ms: 100,
            interpolation_window_ms: 100,
            prediction_enabled: true,
            disconnect_timeout_ms: 5_000,
            send_error_window_ms: 5_000,
            reject_out_of_order: false,
            resource_max: 100.0,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            duration_s: 10,
            packet_loss: 0.1,
            seed: 42,
        }
    }
}

/// Platform config directory for Tether (`<config_dir>/tether`), falling back
/// to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("tether"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject settings that parse but would stall or misbehave a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.session.local_id.is_empty() {
            return invalid("session.local_id", "must not be empty");
        }
        if self.session.channel_id.is_empty() {
            return invalid("session.channel_id", "must not be empty");
        }
        if self.sync.disconnect_timeout_ms == 0 {
            return invalid("sync.disconnect_timeout_ms", "must be positive");
        }
        if !(self.sync.resource_max.is_finite() && self.sync.resource_max > 0.0) {
            return invalid("sync.resource_max", "must be a positive number");
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return invalid("reconnect.max_delay_ms", "must be at least base_delay_ms");
        }
        if !(0.0..=1.0).contains(&self.demo.packet_loss) {
            return invalid("demo.packet_loss", "must be within 0..=1");
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}
