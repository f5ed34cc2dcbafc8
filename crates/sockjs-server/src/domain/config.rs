//! Server configuration.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  It is
//! assembled once at startup from three layers, lowest precedence first:
//!
//! 1. Built-in defaults ([`ServerConfig::default`]).
//! 2. An optional TOML file ([`FileConfig`], loaded with [`load_file_config`]).
//! 3. Command-line flags and environment variables (applied in `main.rs`).
//!
//! # Example file
//!
//! ```toml
//! bind_addr = "127.0.0.1:8081"
//! prefix = "/echo"
//! heartbeat_interval_secs = 25
//! idle_timeout_secs = 5
//! ```
//!
//! Every key is optional; a missing key keeps its default via
//! `#[serde(default = "...")]`, so an empty file is a valid configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_addr` is not an `ip:port` socket address.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    /// `prefix` does not start with `/`, or ends with one.
    #[error("invalid URL prefix '{0}': must start with '/' and not end with '/'")]
    InvalidPrefix(String),
}

/// All runtime configuration for the server.
///
/// Build once at startup and share behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,

    /// URL prefix under which every endpoint is mounted, e.g. `/echo`.
    pub prefix: String,

    /// Longest time a polling receiver waits before answering with a
    /// heartbeat frame.
    pub heartbeat_interval: Duration,

    /// A session with no receiver attached and no traffic for this long is
    /// expired by the sweeper.
    pub idle_timeout: Duration,

    /// How often the sweeper runs.
    pub sweep_interval: Duration,

    /// Streaming responses are finished after this many body bytes, forcing
    /// the client to reconnect and letting intermediaries release buffers.
    pub response_limit: usize,

    /// Reported to clients by the `/info` endpoint.
    pub cookie_needed: bool,
}

impl Default for ServerConfig {
    /// | Field              | Default        |
    /// |--------------------|----------------|
    /// | bind_addr          | `0.0.0.0:8081` |
    /// | prefix             | `/echo`        |
    /// | heartbeat_interval | 25 seconds     |
    /// | idle_timeout       | 5 seconds      |
    /// | sweep_interval     | 1 second       |
    /// | response_limit     | 128 KiB        |
    /// | cookie_needed      | `false`        |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], default_port())),
            prefix: default_prefix(),
            heartbeat_interval: Duration::from_secs(default_heartbeat_secs()),
            idle_timeout: Duration::from_secs(default_idle_timeout_secs()),
            sweep_interval: Duration::from_secs(default_sweep_interval_secs()),
            response_limit: default_response_limit(),
            cookie_needed: false,
        }
    }
}

impl ServerConfig {
    /// Checks the fields that cannot be expressed in the type system.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidPrefix`] for a malformed prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_prefix(&self.prefix)
    }
}

// ── File schema ───────────────────────────────────────────────────────────────

/// On-disk TOML schema.  Durations are whole seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_response_limit")]
    pub response_limit: usize,
    #[serde(default)]
    pub cookie_needed: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            prefix: default_prefix(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            response_limit: default_response_limit(),
            cookie_needed: false,
        }
    }
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not valid TOML for this schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Converts to a validated [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddress`] or [`ConfigError::InvalidPrefix`].
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let bind_addr = parse_bind_addr(&self.bind_addr)?;
        validate_prefix(&self.prefix)?;
        Ok(ServerConfig {
            bind_addr,
            prefix: self.prefix,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            response_limit: self.response_limit,
            cookie_needed: self.cookie_needed,
        })
    }
}

/// Reads and parses a TOML configuration file.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// its content is invalid.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml_str(&text)
}

/// Parses an `ip:port` string.
///
/// # Errors
///
/// [`ConfigError::InvalidAddress`] if `text` is not a socket address.
pub fn parse_bind_addr(text: &str) -> Result<SocketAddr, ConfigError> {
    text.parse()
        .map_err(|_| ConfigError::InvalidAddress(text.to_owned()))
}

/// A prefix is `/` followed by at least one character, with no trailing `/`.
///
/// # Errors
///
/// [`ConfigError::InvalidPrefix`] otherwise.
pub fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.len() < 2 || !prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(ConfigError::InvalidPrefix(prefix.to_owned()));
    }
    Ok(())
}

// ── Serde default value functions ─────────────────────────────────────────────

fn default_port() -> u16 {
    8081
}

fn default_bind_addr() -> String {
    format!("0.0.0.0:{}", default_port())
}

fn default_prefix() -> String {
    "/echo".to_string()
}

fn default_heartbeat_secs() -> u64 {
    25
}

fn default_idle_timeout_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    1
}

fn default_response_limit() -> usize {
    128 * 1024
}

// ── Tests ─────────────────────────────────────────────────────────────────────
