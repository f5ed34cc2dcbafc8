//! The [`Frame`] tagged value: one self-delimited protocol message unit.

use std::fmt;

use crate::protocol::codec::{encode_array, encode_closing, HEARTBEAT_FRAME, OPENING_FRAME};

/// Well-known close codes and reasons.
pub mod close {
    /// Application-initiated close.
    pub const GO_AWAY: u16 = 3000;
    /// Reason text sent with [`GO_AWAY`].
    pub const GO_AWAY_REASON: &str = "Go away!";

    /// A second receiver tried to attach while one was still outstanding.
    pub const ANOTHER_CONNECTION: u16 = 2010;
    /// Reason text sent with [`ANOTHER_CONNECTION`].
    pub const ANOTHER_CONNECTION_REASON: &str = "Another connection still open";

    /// The receiving connection went away before the session was closed.
    pub const INTERRUPTED: u16 = 1002;
    /// Reason text sent with [`INTERRUPTED`].
    pub const INTERRUPTED_REASON: &str = "Connection interrupted";
}

/// One protocol frame.
///
/// | Variant        | Wire form            | When it is sent                        |
/// |----------------|----------------------|----------------------------------------|
/// | `Opening`      | `o`                  | once, first, on session establishment  |
/// | `MessageArray` | `a["m1","m2"]`       | whenever outbound messages are pending |
/// | `Heartbeat`    | `h`                  | when a receiver waited with no data    |
/// | `Closing`      | `c[3000,"Go away!"]` | once, last                             |
///
/// `MessageArray` is never built empty by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Session established.
    Opening,
    /// Session closed with a status code and a reason.
    Closing { status: u16, reason: String },
    /// One or more application messages, in enqueue order.
    MessageArray(Vec<String>),
    /// Keep-alive.
    Heartbeat,
}

impl Frame {
    /// Builds a closing frame.
    pub fn closing(status: u16, reason: impl Into<String>) -> Self {
        Self::Closing {
            status,
            reason: reason.into(),
        }
    }

    /// The closing frame answered to a second concurrent receiver.
    pub fn another_connection() -> Self {
        Self::closing(close::ANOTHER_CONNECTION, close::ANOTHER_CONNECTION_REASON)
    }

    /// Renders the frame to its escaped wire text (without any trailing newline).
    pub fn encode(&self) -> String {
        match self {
            Self::Opening => OPENING_FRAME.to_owned(),
            Self::Heartbeat => HEARTBEAT_FRAME.to_owned(),
            Self::MessageArray(messages) => encode_array(messages),
            Self::Closing { status, reason } => encode_closing(*status, reason),
        }
    }

    /// Returns `true` for the terminal frame.
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Closing { .. })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
