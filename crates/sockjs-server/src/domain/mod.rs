//! Domain layer for sockjs-server.
//!
//! Plain data types with no I/O: runtime configuration and the HTTP
//! request/response model the transports are written against.
//!
//! # What does NOT belong here?
//!
//! - Sockets, listeners or the HTTP parser (infrastructure layer)
//! - Transport behaviour (application layer)

pub mod config;
pub mod http;

pub use config::{ConfigError, FileConfig, ServerConfig};
pub use http::{HttpError, HttpRequest, HttpResponse, Method, Reply};
