//! HTTP listener: accept loop and server start-up.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Building the [`SockJsService`] and starting its companions: the echo
//!    application (consumer of session events) and the idle-session sweeper.
//! 3. Accepting connections and handing each to its own task.
//! 4. Stopping when the `running` flag is cleared.
//!
//! # Scalability
//!
//! Each connection runs in its own Tokio task, and a long-polling request
//! only parks on its session's `Notify`, so thousands of idle pollers cost
//! memory but no threads.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{error, info};

use crate::application::{run_echo, SockJsService};
use crate::domain::config::ServerConfig;
use crate::infrastructure::connection::handle_connection;
use crate::infrastructure::sweeper::spawn_sweeper;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Binds `config.bind_addr` and serves the echo application until `running`
/// is set to `false`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.bind_addr))?;
    info!(
        "listening on http://{}{}",
        config.bind_addr, config.prefix
    );

    let service = start_service(config, Arc::clone(&running));
    serve(listener, service, running).await
}

/// Builds the service and spawns the echo application and the sweeper.
pub fn start_service(config: ServerConfig, running: Arc<AtomicBool>) -> Arc<SockJsService> {
    let idle_timeout = config.idle_timeout;
    let sweep_interval = config.sweep_interval;
    let (service, events) = SockJsService::new(config);
    let service = Arc::new(service);

    tokio::spawn(run_echo(Arc::clone(service.registry()), events));
    spawn_sweeper(
        Arc::clone(service.registry()),
        idle_timeout,
        sweep_interval,
        running,
    );
    service
}

/// Accepts connections on `listener` until `running` is cleared.
///
/// # Errors
///
/// Currently infallible once the listener exists; accept errors are logged
/// and the loop continues.
pub async fn serve(
    listener: TcpListener,
    service: Arc<SockJsService>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    handle_connection(stream, peer, service).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection in the last poll window; re-check the flag.
            }
        }
    }
    Ok(())
}
