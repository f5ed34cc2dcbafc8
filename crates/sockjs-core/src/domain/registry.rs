//! Process-wide table of live sessions.
//!
//! The registry is the only structure shared between all requests.  It is an
//! explicitly owned object (usually wrapped in an `Arc`) that the transport
//! handlers receive as a parameter; nothing in this crate reaches for global
//! state.
//!
//! # Concurrency
//!
//! The table is a [`DashMap`], which shards its keys across independent
//! locks, so lookups and inserts for different ids do not contend.  Mutation
//! of one session's queues is serialized by that session's own lock, never
//! by the table.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::events::SessionEvent;
use crate::domain::session::{Session, SessionError};

/// Owner of every live [`Session`], keyed by session id.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionRegistry {
    /// Creates an empty registry and returns it together with the receiver
    /// for every [`SessionEvent`] its sessions will emit.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Self {
            sessions: DashMap::new(),
            events: tx,
        };
        (registry, rx)
    }

    /// Returns the session registered under `id`, if any.
    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Registers a new `Connecting` session under `id`.
    ///
    /// # Errors
    ///
    /// [`SessionError::DuplicateSession`] if `id` is already registered.  The
    /// check and the insert are one atomic step, so two racing first
    /// contacts cannot both succeed.
    pub fn create(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        match self.sessions.entry(id.to_owned()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateSession(id.to_owned())),
            Entry::Vacant(slot) => {
                let session = Arc::new(Session::new(id, self.events.clone()));
                slot.insert(Arc::clone(&session));
                info!(session_id = %id, "session created");
                Ok(session)
            }
        }
    }

    /// Removes `id` from the table, finalizing it if it was still live.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        session.finalize();
        debug!(session_id = %id, "session removed");
        Some(session)
    }

    /// Removes every session that is already `Closed`, and finalizes and
    /// removes every session idle for longer than `idle_timeout` with no
    /// receiver attached.
    ///
    /// Expired sessions emit [`SessionEvent::Closed`].  Returns the ids that
    /// were removed.
    pub fn sweep(&self, idle_timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut removed = Vec::new();
        self.sessions.retain(|id, session| {
            let expired = session.expire_if_idle(now, idle_timeout);
            if expired {
                removed.push(id.clone());
            }
            !expired
        });
        if !removed.is_empty() {
            debug!("sweep removed {} session(s)", removed.len());
        }
        removed
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
