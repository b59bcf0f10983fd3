//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Tether command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tether", about = "Remote entity synchronization")]
pub struct CliArgs {
    /// Local participant id.
    #[arg(long)]
    pub local_id: Option<String>,

    /// Channel (session id) to join.
    #[arg(long)]
    pub channel: Option<String>,

    /// Minimum interval between outbound state sends, in milliseconds.
    #[arg(long)]
    pub send_interval_ms: Option<u64>,

    /// Silence after which a remote entity is evicted, in milliseconds.
    #[arg(long)]
    pub disconnect_timeout_ms: Option<u64>,

    /// Fraction of loopback broadcasts to drop in the demo.
    #[arg(long)]
    pub packet_loss: Option<f64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref id) = args.local_id {
            self.session.local_id = id.clone();
        }
        if let Some(ref channel) = args.channel {
            self.session.channel_id = channel.clone();
        }
        if let Some(ms) = args.send_interval_ms {
            self.sync.min_send_interval_ms = ms;
        }
        if let Some(ms) = args.disconnect_timeout_ms {
            self.sync.disconnect_timeout_ms = ms;
        }
        if let Some(loss) = args.packet_loss {
            self.demo.packet_loss = loss.clamp(0.0, 1.0);
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            local_id: Some("p2".to_string()),
            send_interval_ms: Some(16),
            packet_loss: Some(3.0),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.session.local_id, "p2");
        assert_eq!(config.sync.min_send_interval_ms, 16);
        assert_eq!(config.demo.packet_loss, 1.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.session.channel_id, "lobby");
        assert_eq!(config.sync.disconnect_timeout_ms, 5_000);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["tether", "--channel", "arena-3", "--log-level", "debug"]);
        assert_eq!(args.channel.as_deref(), Some("arena-3"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.local_id.is_none());
    }
}
