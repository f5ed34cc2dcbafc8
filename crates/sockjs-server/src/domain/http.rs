//! Minimal HTTP request/response model shared by the transports and the
//! connection layer.
//!
//! Transports never see a socket.  They receive an [`HttpRequest`] whose body
//! has already been read in full, and return a [`Reply`]: either a complete
//! [`HttpResponse`] or, for streaming transports, the reading half of a
//! chunked channel that the connection layer drains onto the wire.

use bytes::Bytes;
use sockjs_core::ChunkedReader;
use thiserror::Error;

/// `Content-Type` values used by the transports.
pub mod content_type {
    pub const PLAIN: &str = "text/plain; charset=UTF-8";
    pub const JAVASCRIPT: &str = "application/javascript; charset=UTF-8";
    pub const HTML: &str = "text/html; charset=UTF-8";
    pub const JSON: &str = "application/json; charset=UTF-8";
    pub const FORM: &str = "application/x-www-form-urlencoded";
}

/// Request methods the router distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Options,
    Other(String),
}

impl Method {
    pub fn parse(text: &str) -> Self {
        match text {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Options => "OPTIONS",
            Self::Other(m) => m,
        }
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// One fully-read HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path component of the request target, without the query string.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    /// Builds a request from a method and a request target such as
    /// `/echo/000/abc/jsonp?c=cb`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };
        Self {
            method,
            path,
            query,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of cookie `name` from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie")?.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
    }

    /// Decoded value of query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// `true` if the body is declared as `application/x-www-form-urlencoded`.
    pub fn is_form_encoded(&self) -> bool {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(content_type::FORM))
    }

    /// Decoded value of form field `name` from a form-encoded body.
    pub fn form_field(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(&self.body)
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// A complete response with a fixed-length body.
///
/// The body is always [`Bytes`], so its byte length is known before the head
/// is written and becomes the `Content-Length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A response with a body and its `Content-Type`.
    pub fn with_body(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(status)
            .with_header("Content-Type", content_type)
            .body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

/// What a transport hands back to the connection layer.
#[derive(Debug)]
pub enum Reply {
    Full(HttpResponse),
    /// Status and headers arrive as the first event on the reader.
    Streaming(ChunkedReader),
}

impl From<HttpResponse> for Reply {
    fn from(response: HttpResponse) -> Self {
        Self::Full(response)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A request rejection, carried as a value until the transport boundary
/// turns it into a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("HTTP {status}: {body}")]
pub struct HttpError {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl HttpError {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: content_type::PLAIN,
        }
    }

    /// Same as [`new`](Self::new) with an HTML content type.
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            content_type: content_type::HTML,
            ..Self::new(status, body)
        }
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse::with_body(self.status, self.content_type, self.body)
    }
}

/// Standard reason phrase for the status codes this server emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
