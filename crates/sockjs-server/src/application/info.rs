//! The greeting page and the `/info` document clients fetch before choosing
//! a transport.

use serde::Serialize;

use crate::domain::config::ServerConfig;
use crate::domain::http::{content_type, HttpError, HttpResponse};

pub const GREETING: &str = "Welcome to SockJS!\n";

/// Body of `GET <prefix>/info`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InfoDocument {
    /// Always `false`: this server offers HTTP transports only.
    pub websocket: bool,
    pub cookie_needed: bool,
    pub origins: Vec<String>,
    /// Random value clients may use to seed their own ids.
    pub entropy: u32,
}

impl InfoDocument {
    pub fn for_config(config: &ServerConfig) -> Self {
        Self {
            websocket: false,
            cookie_needed: config.cookie_needed,
            origins: vec!["*:*".to_string()],
            entropy: rand::random(),
        }
    }
}

pub fn greeting() -> HttpResponse {
    HttpResponse::with_body(200, content_type::PLAIN, GREETING)
}

/// # Errors
///
/// 500 if the document cannot be serialized.
pub fn info(config: &ServerConfig) -> Result<HttpResponse, HttpError> {
    let body = serde_json::to_vec(&InfoDocument::for_config(config))
        .map_err(|e| HttpError::new(500, format!("failed to encode info: {e}")))?;
    Ok(HttpResponse::with_body(200, content_type::JSON, body))
}
