//! TOML configuration for the client binary.
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! host = "craft.example.org"
//! port = 4080
//!
//! [timing]
//! reconnect_delay_ms = 10000
//! keepalive_interval_ms = 30000
//! inactivity_timeout_ms = 60000
//! ```
//!
//! Every field is optional.  Absent fields take the value of the matching
//! [`ConnectionConfig::default`] entry, so an empty file (or no file at all)
//! yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::{ConnectionConfig, DEFAULT_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A timing field is zero.
    #[error("timing.{field} must be greater than zero")]
    ZeroTiming { field: &'static str },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where the game server lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Connection timers, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    ConnectionConfig::default().host
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_reconnect_delay_ms() -> u64 {
    millis(ConnectionConfig::default().reconnect_delay)
}
fn default_keepalive_interval_ms() -> u64 {
    millis(ConnectionConfig::default().keepalive_interval)
}
fn default_inactivity_timeout_ms() -> u64 {
    millis(ConnectionConfig::default().inactivity_timeout)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            timing: TimingConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
        }
    }
}

impl TimingConfig {
    /// Rejects zero durations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroTiming`] naming the first zero field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("keepalive_interval_ms", self.keepalive_interval_ms),
            ("inactivity_timeout_ms", self.inactivity_timeout_ms),
        ];
        match fields.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::ZeroTiming { field }),
            None => Ok(()),
        }
    }
}

impl ClientConfig {
    /// Builds the runtime configuration for [`Connection::open`](crate::infrastructure::network::Connection::open).
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            reconnect_delay: Duration::from_millis(self.timing.reconnect_delay_ms),
            keepalive_interval: Duration::from_millis(self.timing.keepalive_interval_ms),
            inactivity_timeout: Duration::from_millis(self.timing.inactivity_timeout_ms),
            ..ConnectionConfig::default()
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads `ClientConfig` from `path`, returning `ClientConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::ZeroTiming`] if a timing field is zero.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config: ClientConfig = toml::from_str(&content)?;
            config.timing.validate()?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(ClientConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
