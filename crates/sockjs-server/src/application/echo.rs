//! The echo application: every message a client sends is queued straight
//! back to the same session.
//!
//! This is the consumer end of the registry's event channel.  A real
//! application would replace [`handle_event`] with its own logic; the
//! transports do not change.

use std::sync::Arc;

use sockjs_core::{SessionEvent, SessionRegistry};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Drains `events` until every sender (the registry and its sessions) is
/// gone.
pub async fn run_echo(
    registry: Arc<SessionRegistry>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        handle_event(&registry, event);
    }
    debug!("event channel closed; echo application stopped");
}

/// Reacts to one session event.
pub fn handle_event(registry: &SessionRegistry, event: SessionEvent) {
    match event {
        SessionEvent::Opened { session_id } => info!(session_id = %session_id, "client connected"),
        SessionEvent::Message { session_id, text } => {
            let Some(session) = registry.lookup(&session_id) else {
                debug!(session_id = %session_id, "message for a session that is already gone");
                return;
            };
            if let Err(e) = session.enqueue_outbound(text) {
                debug!(session_id = %session_id, "echo dropped: {e}");
            }
        }
        SessionEvent::Closed {
            session_id,
            status,
            reason,
        } => info!(session_id = %session_id, status, reason = %reason, "client disconnected"),
    }
}
