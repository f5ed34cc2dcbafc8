//! # sockjs-core
//!
//! Protocol engine for a browser-compatibility socket emulated over plain
//! HTTP.  Browsers (or networks) that cannot hold a native full-duplex socket
//! fall back to a sequence of ordinary HTTP requests; this crate makes those
//! independent request/response cycles behave like one ordered, bidirectional
//! connection.
//!
//! The crate has no sockets and no HTTP parser.  It is used by
//! `sockjs-server`, which owns the connection layer.
//!
//! # Architecture overview
//!
//! - **`protocol`** – The wire format.  Every transport sends the same four
//!   frame kinds (`o`, `c[..]`, `a[..]`, `h`) and escapes the same set of
//!   unsafe code points, so every client observes byte-identical payloads.
//!
//! - **`domain`** – The per-client [`Session`] state machine
//!   (`Connecting → Open → Closing → Closed`), the single-receiver rule, and
//!   the process-wide [`SessionRegistry`] that owns every live session.
//!
//! - **`streaming`** – An adapter that turns a series of `write` calls into
//!   HTTP/1.1 chunked transfer-coding for transports that hold one response
//!   open and push many frames down it.

pub mod domain;
pub mod protocol;
pub mod streaming;

pub use domain::events::SessionEvent;
pub use domain::registry::SessionRegistry;
pub use domain::session::{ReceiverGuard, Session, SessionError, SessionState};
pub use protocol::codec::{encode_array, encode_closing, escape, CodecError};
pub use protocol::frame::Frame;
pub use streaming::chunked::{chunked_channel, ChunkEvent, ChunkedReader, ChunkedWriter, StreamError};
