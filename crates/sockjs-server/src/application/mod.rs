//! Application layer: the transports and the echo application.
//!
//! Every transport is a plain function from an [`HttpRequest`] (plus the
//! shared [`SockJsService`]) to a response.  None of them touch a socket, so
//! each can be tested by calling it directly.
//!
//! [`HttpRequest`]: crate::domain::http::HttpRequest

pub mod echo;
pub mod info;
pub mod jsonp;
pub mod polling;
pub mod routes;
pub mod service;
pub mod xhr;

pub use echo::run_echo;
pub use routes::{resolve, Filter, Resolution, Route, Transport};
pub use service::SockJsService;
