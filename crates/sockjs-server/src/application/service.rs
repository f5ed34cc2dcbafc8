//! Request dispatch: resolve the route, run the transport, decorate the
//! response.
//!
//! [`SockJsService`] is the one object the connection layer talks to.  It
//! owns the session registry and the configuration, and turns every
//! [`HttpRequest`] into a [`Reply`].  Transport rejections travel as
//! [`HttpError`] values and are converted to responses here, in one place.

use std::sync::Arc;

use sockjs_core::{SessionEvent, SessionRegistry};
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::routes::{apply_filters, resolve, Filter, Resolution, Transport};
use crate::application::{info, jsonp, xhr};
use crate::domain::config::ServerConfig;
use crate::domain::http::{HttpError, HttpRequest, HttpResponse, Reply};

/// Preflight answers may be cached by the browser for a year.
const PREFLIGHT_MAX_AGE: &str = "31536000";

/// Shared entry point for all transports.
#[derive(Debug)]
pub struct SockJsService {
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
}

impl SockJsService {
    /// Creates the service with an empty registry.  The returned receiver
    /// yields every [`SessionEvent`] and belongs to the application.
    pub fn new(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (registry, events) = SessionRegistry::new();
        let service = Self {
            registry: Arc::new(registry),
            config,
        };
        (service, events)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Routes and handles one request.
    pub async fn handle(&self, request: HttpRequest) -> Reply {
        let resolution = resolve(&self.config.prefix, &request.method, &request.path);
        debug!(
            method = request.method.as_str(),
            path = %request.path,
            "dispatch: {resolution:?}"
        );

        match resolution {
            Resolution::NotFound => HttpError::new(404, "Not found").into_response().into(),
            Resolution::MethodNotAllowed(transport) => HttpResponse::new(405)
                .with_header("Allow", transport.route().method.as_str())
                .into(),
            Resolution::Preflight(transport) => preflight(&request, transport).into(),
            Resolution::Matched {
                transport,
                session_id,
            } => {
                let session_id = session_id.unwrap_or_default();
                let filters = transport.route().filters;
                match self.run(transport, &request, &session_id, filters).await {
                    Ok(Reply::Full(response)) => decorate(response, filters, &request).into(),
                    Ok(streaming) => streaming,
                    Err(err) => {
                        debug!(status = err.status, "request rejected: {}", err.body);
                        decorate(err.into_response(), filters, &request).into()
                    }
                }
            }
        }
    }

    async fn run(
        &self,
        transport: Transport,
        request: &HttpRequest,
        session_id: &str,
        filters: &[Filter],
    ) -> Result<Reply, HttpError> {
        match transport {
            Transport::Greeting => Ok(info::greeting().into()),
            Transport::Info => info::info(&self.config).map(Reply::from),
            Transport::Jsonp => jsonp::receive(self, request, session_id)
                .await
                .map(Reply::from),
            Transport::JsonpSend => jsonp::send(self, request, session_id).map(Reply::from),
            Transport::Xhr => xhr::poll(self, session_id).await.map(Reply::from),
            Transport::XhrSend => xhr::send(self, request, session_id).map(Reply::from),
            Transport::XhrStreaming => xhr::streaming(self, request, session_id, filters),
        }
    }
}

fn decorate(mut response: HttpResponse, filters: &[Filter], request: &HttpRequest) -> HttpResponse {
    apply_filters(filters, request, &mut response.headers);
    response
}

/// `204` answer to a CORS preflight `OPTIONS` request.
fn preflight(request: &HttpRequest, transport: Transport) -> HttpResponse {
    let route = transport.route();
    let mut response = HttpResponse::new(204)
        .with_header(
            "Access-Control-Allow-Methods",
            format!("OPTIONS, {}", route.method.as_str()),
        )
        .with_header("Access-Control-Max-Age", PREFLIGHT_MAX_AGE)
        .with_header("Cache-Control", format!("public, max-age={PREFLIGHT_MAX_AGE}"));
    if let Some(requested) = request.header("access-control-request-headers") {
        response = response.with_header("Access-Control-Allow-Headers", requested);
    }
    // The preflight itself is cacheable, so NoCache is left out.
    let filters: Vec<Filter> = route
        .filters
        .iter()
        .copied()
        .filter(|f| *f != Filter::NoCache)
        .collect();
    decorate(response, &filters, request)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::http::Method;

    fn service() -> SockJsService {
        SockJsService::new(ServerConfig::default()).0
    }

    async fn full(svc: &SockJsService, request: HttpRequest) -> HttpResponse {
        match svc.handle(request).await {
            Reply::Full(response) => response,
            Reply::Streaming(_) => panic!("expected a full response"),
        }
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = full(&service(), HttpRequest::new(Method::Get, "/nowhere")).await;
        assert_eq!(response.status, 404);
        assert_eq!(&response.body[..], b"Not found");
    }

    #[tokio::test]
    async fn test_wrong_method_is_405_with_allow_header() {
        let response = full(
            &service(),
            HttpRequest::new(Method::Get, "/echo/000/abc/xhr_send"),
        )
        .await;
        assert_eq!(response.status, 405);
        assert_eq!(response.header("allow"), Some("POST"));
    }

    #[tokio::test]
    async fn test_greeting() {
        let response = full(&service(), HttpRequest::new(Method::Get, "/echo")).await;
        assert_eq!(&response.body[..], b"Welcome to SockJS!\n");
    }

    #[tokio::test]
    async fn test_jsonp_send_404_carries_session_cookie() {
        // Arrange
        let request = HttpRequest::new(Method::Post, "/echo/000/abc123/jsonp_send")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("d=hello");

        // Act
        let response = full(&service(), request).await;

        // Assert
        assert_eq!(response.status, 404);
        assert_eq!(&response.body[..], b"Session is not open!");
        assert_eq!(response.header("set-cookie"), Some("JSESSIONID=dummy; path=/"));
    }

    #[tokio::test]
    async fn test_jsonp_opening_carries_cookie_cors_and_no_cache() {
        // Arrange
        let request = HttpRequest::new(Method::Get, "/echo/000/abc123/jsonp?c=cb")
            .with_header("Cookie", "JSESSIONID=s1");

        // Act
        let response = full(&service(), request).await;

        // Assert
        assert_eq!(&response.body[..], b"cb(\"o\");\r\n");
        assert_eq!(response.header("set-cookie"), Some("JSESSIONID=s1; path=/"));
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header("cache-control"),
            Some("no-store, no-cache, must-revalidate, max-age=0")
        );
    }

    #[tokio::test]
    async fn test_preflight_is_204_without_no_cache() {
        // Arrange
        let request = HttpRequest::new(Method::Options, "/echo/000/abc/xhr")
            .with_header("Origin", "http://app.test")
            .with_header("Access-Control-Request-Headers", "content-type");

        // Act
        let response = full(&service(), request).await;

        // Assert
        assert_eq!(response.status, 204);
        assert_eq!(
            response.header("access-control-allow-methods"),
            Some("OPTIONS, POST")
        );
        assert_eq!(
            response.header("access-control-allow-headers"),
            Some("content-type")
        );
        assert_eq!(
            response.header("cache-control"),
            Some("public, max-age=31536000")
        );
        assert_eq!(
            response.header("access-control-allow-origin"),
            Some("http://app.test")
        );
    }

    #[tokio::test]
    async fn test_xhr_streaming_returns_streaming_reply() {
        let reply = service()
            .handle(HttpRequest::new(Method::Post, "/echo/000/abc/xhr_streaming"))
            .await;
        assert!(matches!(reply, Reply::Streaming(_)));
    }
}
