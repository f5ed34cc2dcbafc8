//! Events emitted by sessions to the application layer.
//!
//! The application never reaches into a session to pull inbound data.
//! Instead the registry hands out the receiving half of a channel, and every
//! session pushes [`SessionEvent`]s into the sending half.  This is both the
//! inbound-message sink and the lifecycle hook.
//!
//! # Ordering
//!
//! A session sends its events while holding its own state lock, so for a
//! single session the channel order equals the order in which messages were
//! accepted.  Events from different sessions may interleave freely.

/// Notification sent from a session to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The opening frame was delivered.  The session is `Open`, or still
    /// `Closing` if it was closed before anyone received it.
    Opened { session_id: String },

    /// The client sent a message.
    Message { session_id: String, text: String },

    /// The session reached `Closed`, either because the closing frame was
    /// delivered or because the registry expired it.
    Closed {
        session_id: String,
        status: u16,
        reason: String,
    },
}

impl SessionEvent {
    /// The id of the session that produced this event.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Opened { session_id }
            | Self::Message { session_id, .. }
            | Self::Closed { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_for_every_variant() {
        let events = [
            SessionEvent::Opened {
                session_id: "a".into(),
            },
            SessionEvent::Message {
                session_id: "a".into(),
                text: "x".into(),
            },
            SessionEvent::Closed {
                session_id: "a".into(),
                status: 3000,
                reason: "Go away!".into(),
            },
        ];
        for event in &events {
            assert_eq!(event.session_id(), "a");
        }
    }
}
