//! Session plumbing shared by every transport: find-or-create, receive one
//! frame, and hand inbound payloads to a session.

use std::sync::Arc;
use std::time::Duration;

use sockjs_core::{Frame, Session, SessionError, SessionRegistry};
use tracing::debug;

use crate::domain::http::HttpError;

pub const SESSION_NOT_OPEN: &str = "Session is not open!";

pub fn session_not_open() -> HttpError {
    HttpError::new(404, SESSION_NOT_OPEN)
}

/// Result of [`lookup_or_create`].
#[derive(Debug)]
pub enum Contact {
    /// The session was created by this request.
    New(Arc<Session>),
    Existing(Arc<Session>),
}

impl Contact {
    pub fn into_session(self) -> Arc<Session> {
        match self {
            Self::New(s) | Self::Existing(s) => s,
        }
    }
}

/// Returns the session for `id`, creating it on first contact.
///
/// Two first contacts for the same id may race; the loser of `create` falls
/// back to the session the winner registered.
///
/// # Errors
///
/// 404 if the session vanished between the failed create and the lookup.
pub fn lookup_or_create(registry: &SessionRegistry, id: &str) -> Result<Contact, HttpError> {
    if let Some(session) = registry.lookup(id) {
        return Ok(Contact::Existing(session));
    }
    match registry.create(id) {
        Ok(session) => Ok(Contact::New(session)),
        Err(SessionError::DuplicateSession(_)) => registry
            .lookup(id)
            .map(Contact::Existing)
            .ok_or_else(session_not_open),
        Err(_) => Err(session_not_open()),
    }
}

/// Attaches as receiver and waits for one frame.
///
/// A concurrent receiver is answered with the "another connection" closing
/// frame without touching the session.
///
/// # Errors
///
/// 404 if the session is closed.
pub async fn receive_frame(session: &Arc<Session>, heartbeat: Duration) -> Result<Frame, HttpError> {
    let guard = match session.attach() {
        Ok(guard) => guard,
        Err(SessionError::ConcurrentReceive(_)) => {
            debug!(session_id = %session.id(), "rejecting concurrent receiver");
            return Ok(Frame::another_connection());
        }
        Err(_) => return Err(session_not_open()),
    };
    guard
        .next_frame(heartbeat)
        .await
        .map_err(|_| session_not_open())
}

/// Passes one client message to an existing session.
///
/// # Errors
///
/// 404 if the session is unknown, closing or closed.
pub fn deliver_inbound(registry: &SessionRegistry, id: &str, payload: String) -> Result<(), HttpError> {
    let session = registry.lookup(id).ok_or_else(session_not_open)?;
    session
        .receive_message(payload)
        .map_err(|_| session_not_open())
}

/// Decodes a raw send body as one text message.
///
/// # Errors
///
/// 400 `Payload expected.` if the body is not valid UTF-8.
pub fn text_payload(body: &[u8]) -> Result<String, HttpError> {
    String::from_utf8(body.to_vec()).map_err(|_| HttpError::new(400, "Payload expected."))
}
