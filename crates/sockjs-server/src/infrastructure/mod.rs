//! Infrastructure layer for sockjs-server.
//!
//! Everything that touches the network or runs in the background:
//!
//! - Binding the TCP listener and accepting connections
//! - Reading HTTP/1.1 requests and writing full or chunked responses
//! - Expiring idle sessions on a timer
//!
//! # What does NOT belong here?
//!
//! - Transport behaviour (that is the application layer)
//! - Configuration parsing (that is done in `main.rs` and `domain::config`)

pub mod connection;
pub mod http_server;
pub mod sweeper;

pub use http_server::{run_server, serve, start_service};
