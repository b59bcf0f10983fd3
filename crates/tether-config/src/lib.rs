//! Configuration for the Tether synchronization stack.
//!
//! Settings persist to disk as a RON file, can be overridden from the command
//! line via clap, and tolerate missing or unknown fields so older config files
//! keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, DemoConfig, ReconnectSettings, SessionConfig, SyncSettings,
    default_config_dir,
};
pub use error::ConfigError;
