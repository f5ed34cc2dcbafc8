//! sockjs-server: entry point.
//!
//! Serves the echo application over the JSONP and XHR transports.  Every
//! message a client sends comes straight back on the same session, which
//! makes this binary a convenient target for client test suites.
//!
//! # Usage
//!
//! ```text
//! sockjs-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>             TOML configuration file
//!   --bind <ADDR>               Listen address [default: 0.0.0.0:8081]
//!   --prefix <PATH>             URL prefix [default: /echo]
//!   --heartbeat-interval <SECS> Heartbeat interval [default: 25]
//!   --idle-timeout <SECS>       Idle session timeout [default: 5]
//!   --sweep-interval <SECS>     Sweeper period [default: 1]
//!   --response-limit <BYTES>    Streaming response limit [default: 131072]
//!   --cookie-needed <BOOL>      Reported by /info [default: false]
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the `--config` file, then flags and environment
//! variables.  A flag beats its environment variable.
//!
//! | Variable                    | Flag                   |
//! |-----------------------------|------------------------|
//! | `SOCKJS_CONFIG`             | `--config`             |
//! | `SOCKJS_BIND`               | `--bind`               |
//! | `SOCKJS_PREFIX`             | `--prefix`             |
//! | `SOCKJS_HEARTBEAT_INTERVAL` | `--heartbeat-interval` |
//! | `SOCKJS_IDLE_TIMEOUT`       | `--idle-timeout`       |
//! | `SOCKJS_SWEEP_INTERVAL`     | `--sweep-interval`     |
//! | `SOCKJS_RESPONSE_LIMIT`     | `--response-limit`     |
//! | `SOCKJS_COOKIE_NEEDED`      | `--cookie-needed`      |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sockjs_server::domain::config::{load_file_config, FileConfig, ServerConfig};
use sockjs_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// HTTP-emulated socket server (echo application).
///
/// Every option is optional; unset options fall back to the config file and
/// then to built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "sockjs-server",
    about = "JSONP and XHR transports for an emulated browser socket",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "SOCKJS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, `ip:port`.
    #[arg(long, env = "SOCKJS_BIND")]
    bind: Option<String>,

    /// URL prefix under which the endpoints are mounted.
    #[arg(long, env = "SOCKJS_PREFIX")]
    prefix: Option<String>,

    /// Seconds a polling request waits before a heartbeat frame.
    #[arg(long, env = "SOCKJS_HEARTBEAT_INTERVAL")]
    heartbeat_interval: Option<u64>,

    /// Seconds of inactivity after which a session is expired.
    #[arg(long, env = "SOCKJS_IDLE_TIMEOUT")]
    idle_timeout: Option<u64>,

    /// Seconds between sweeps for idle sessions.
    #[arg(long, env = "SOCKJS_SWEEP_INTERVAL")]
    sweep_interval: Option<u64>,

    /// Bytes after which a streaming response is finished.
    #[arg(long, env = "SOCKJS_RESPONSE_LIMIT")]
    response_limit: Option<usize>,

    /// Value of `cookie_needed` in the `/info` document.
    #[arg(long, env = "SOCKJS_COOKIE_NEEDED")]
    cookie_needed: Option<bool>,
}

impl Cli {
    /// Layers the CLI values over the config file (or defaults) and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, or the bind
    /// address or prefix is invalid.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut file = match &self.config {
            Some(path) => load_file_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => FileConfig::default(),
        };

        if let Some(bind) = self.bind {
            file.bind_addr = bind;
        }
        if let Some(prefix) = self.prefix {
            file.prefix = prefix;
        }
        if let Some(secs) = self.heartbeat_interval {
            file.heartbeat_interval_secs = secs;
        }
        if let Some(secs) = self.idle_timeout {
            file.idle_timeout_secs = secs;
        }
        if let Some(secs) = self.sweep_interval {
            file.sweep_interval_secs = secs;
        }
        if let Some(limit) = self.response_limit {
            file.response_limit = limit;
        }
        if let Some(needed) = self.cookie_needed {
            file.cookie_needed = needed;
        }

        file.into_server_config()
            .context("invalid server configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level
///    (default `info`).
/// 2. CLI arguments (and environment variables) are parsed with `clap`.
/// 3. The configuration is assembled and validated.
/// 4. A Ctrl+C handler clears the shared `running` flag.
/// 5. [`run_server`] serves until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        "sockjs-server starting: heartbeat={:?}, idle_timeout={:?}",
        config.heartbeat_interval, config.idle_timeout
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(config, running).await?;

    info!("sockjs-server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
