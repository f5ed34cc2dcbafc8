//! JSONP polling transport: the `jsonp` receiver and the `jsonp_send` sender.
//!
//! The receiver answers a `<script>` tag, so its body is JavaScript that
//! calls the client's callback with the frame text:
//!
//! ```text
//! cb("a[\"hi\",\"there\"]");\r\n
//! ```
//!
//! The frame is already JSON, and is JSON-encoded a second time into a
//! string literal; the client unwraps it with one `JSON.parse`.

use serde_json::Value;
use sockjs_core::Frame;
use tracing::debug;

use crate::application::polling::{
    deliver_inbound, lookup_or_create, receive_frame, session_not_open, text_payload, Contact,
};
use crate::application::routes::{apply_filters, Filter};
use crate::application::service::SockJsService;
use crate::domain::http::{content_type, HttpError, HttpRequest, HttpResponse};

/// Extra filters on the response that opens a session.
const OPENING_FILTERS: &[Filter] = &[Filter::NoCache, Filter::Cors];

/// Handles `GET .../<session_id>/jsonp?c=<callback>`.
///
/// # Errors
///
/// - 500 if `c` is missing or not a plain identifier path.
/// - 404 if the session is closed.
pub async fn receive(
    service: &SockJsService,
    request: &HttpRequest,
    session_id: &str,
) -> Result<HttpResponse, HttpError> {
    let callback = callback_param(request)?;
    let heartbeat = service.config().heartbeat_interval;

    match lookup_or_create(service.registry(), session_id)? {
        Contact::Existing(session) => {
            let frame = receive_frame(&session, heartbeat).await?;
            Ok(HttpResponse::with_body(
                200,
                content_type::PLAIN,
                wrap(&callback, &frame),
            ))
        }
        Contact::New(session) => {
            // A fresh session answers "o" at once; no wait window applies.
            let frame = receive_frame(&session, heartbeat).await?;
            let mut response =
                HttpResponse::with_body(200, content_type::JAVASCRIPT, wrap(&callback, &frame));
            apply_filters(OPENING_FILTERS, request, &mut response.headers);
            Ok(response)
        }
    }
}

/// Handles `POST .../<session_id>/jsonp_send`.
///
/// A form-encoded body carries the message in field `d`; any other body is
/// the message itself.
///
/// # Errors
///
/// - 500 `Payload expected!` for an empty body.
/// - 404 `Session is not open!` for an unknown or closed session.
/// - 400 `Payload expected.` for a form body without a non-empty `d`, or a
///   raw body that is not valid UTF-8.
pub fn send(
    service: &SockJsService,
    request: &HttpRequest,
    session_id: &str,
) -> Result<HttpResponse, HttpError> {
    if request.body.is_empty() {
        return Err(HttpError::html(500, "Payload expected!"));
    }
    if service.registry().lookup(session_id).is_none() {
        return Err(session_not_open());
    }

    let payload = if request.is_form_encoded() {
        request
            .form_field("d")
            .filter(|d| !d.is_empty())
            .ok_or_else(|| HttpError::new(400, "Payload expected."))?
    } else {
        text_payload(&request.body)?
    };

    debug!(session_id, bytes = payload.len(), "jsonp_send payload");
    deliver_inbound(service.registry(), session_id, payload)?;
    Ok(HttpResponse::with_body(200, content_type::PLAIN, "ok"))
}

/// `<callback>(<frame as a JSON string>);\r\n`
pub fn wrap(callback: &str, frame: &Frame) -> String {
    let literal = Value::String(frame.encode()).to_string();
    format!("{callback}({literal});\r\n")
}

fn callback_param(request: &HttpRequest) -> Result<String, HttpError> {
    let callback = request
        .query_param("c")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| HttpError::html(500, "\"callback\" parameter required"))?;
    if !callback
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(HttpError::html(500, "invalid \"callback\" parameter"));
    }
    Ok(callback)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
