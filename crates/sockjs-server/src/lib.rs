//! sockjs-server library crate.
//!
//! HTTP transports for an emulated browser socket, built on `sockjs-core`.
//! Browsers that cannot hold a native socket open fall back to JSONP or
//! XMLHttpRequest polling and streaming; this crate serves those endpoints
//! and maps each request onto a long-lived session.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSONP / XHR polling / XHR streaming)
//!         ↕  HTTP/1.1
//! [sockjs-server]
//!   ├── domain/           ServerConfig, HttpRequest/HttpResponse, HttpError
//!   ├── application/      Routing table, transports, echo application
//!   └── infrastructure/
//!         ├── http_server  Accept loop, start-up
//!         ├── connection   httparse request reader, response writer
//!         └── sweeper      Idle-session expiry
//!         ↕
//! [sockjs-core]  frames, sessions, registry, chunked adapter
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `sockjs-core`; it never sees a
//!   socket, so every transport is unit-testable.
//! - `infrastructure` depends on everything else plus `tokio::net` and
//!   `httparse`.

/// Domain layer: configuration and the HTTP model (no I/O).
pub mod domain;

/// Application layer: routing and transports.
pub mod application;

/// Infrastructure layer: listener, connections, sweeper.
pub mod infrastructure;
