//! XMLHttpRequest transports: `xhr` (polling), `xhr_send` and
//! `xhr_streaming`.
//!
//! These reuse the session plumbing of the JSONP pair but carry frames
//! unwrapped, one per line.  `xhr_streaming` keeps the response open and
//! pushes each frame as its own HTTP chunk until the session closes or the
//! response has carried `response_limit` bytes.

use std::sync::Arc;
use std::time::Duration;

use sockjs_core::{chunked_channel, ChunkedWriter, Frame, ReceiverGuard, SessionError, StreamError};
use tracing::{debug, info};

use crate::application::polling::{
    deliver_inbound, lookup_or_create, receive_frame, session_not_open, text_payload,
};
use crate::application::routes::{apply_filters, Filter};
use crate::application::service::SockJsService;
use crate::domain::http::{content_type, HttpError, HttpRequest, HttpResponse, Reply};

/// Bytes of `h` sent before the first frame of a stream.  Some browsers
/// buffer the first 2 KiB of a streaming response before firing progress
/// events.
pub const PRELUDE_LEN: usize = 2048;

/// Handles `POST .../<session_id>/xhr`.
///
/// # Errors
///
/// 404 if the session is closed.
pub async fn poll(
    service: &SockJsService,
    session_id: &str,
) -> Result<HttpResponse, HttpError> {
    let session = lookup_or_create(service.registry(), session_id)?.into_session();
    let frame = receive_frame(&session, service.config().heartbeat_interval).await?;
    Ok(HttpResponse::with_body(
        200,
        content_type::JAVASCRIPT,
        frame_line(&frame),
    ))
}

/// Handles `POST .../<session_id>/xhr_send`.  The whole body is one message.
///
/// # Errors
///
/// - 500 `Payload expected!` for an empty body.
/// - 400 `Payload expected.` for a body that is not valid UTF-8.
/// - 404 `Session is not open!` for an unknown or closed session.
pub fn send(
    service: &SockJsService,
    request: &HttpRequest,
    session_id: &str,
) -> Result<HttpResponse, HttpError> {
    if request.body.is_empty() {
        return Err(HttpError::html(500, "Payload expected!"));
    }
    let payload = text_payload(&request.body)?;
    deliver_inbound(service.registry(), session_id, payload)?;
    Ok(HttpResponse::new(204).with_header("Content-Type", content_type::PLAIN))
}

/// Handles `POST .../<session_id>/xhr_streaming`.
///
/// Commits the response head and prelude, then spawns a task that moves
/// frames from the session into the chunked body.  The returned reply
/// carries the reading half for the connection layer.
///
/// # Errors
///
/// 404 if the session is closed.
pub fn streaming(
    service: &SockJsService,
    request: &HttpRequest,
    session_id: &str,
    filters: &[Filter],
) -> Result<Reply, HttpError> {
    let session = lookup_or_create(service.registry(), session_id)?.into_session();
    let receiver = match session.attach() {
        Ok(guard) => Some(guard),
        Err(SessionError::ConcurrentReceive(_)) => None,
        Err(_) => return Err(session_not_open()),
    };

    let mut headers = vec![("Content-Type".to_string(), content_type::JAVASCRIPT.to_string())];
    apply_filters(filters, request, &mut headers);

    let (mut writer, reader) = chunked_channel();
    writer.open(200, headers).map_err(stream_failure)?;
    writer.write(&prelude()).map_err(stream_failure)?;

    match receiver {
        Some(guard) => {
            let config = service.config();
            tokio::spawn(pump(
                guard,
                writer,
                config.heartbeat_interval,
                config.response_limit,
            ));
        }
        None => {
            debug!(session_id, "streaming receiver rejected: another connection open");
            writer
                .write(frame_line(&Frame::another_connection()).as_bytes())
                .and_then(|()| writer.finish())
                .map_err(stream_failure)?;
        }
    }
    Ok(Reply::Streaming(reader))
}

/// Moves frames from the session into the stream until the session closes,
/// the client goes away, or `limit` body bytes have been sent.
async fn pump(guard: ReceiverGuard, mut writer: ChunkedWriter, heartbeat: Duration, limit: usize) {
    let session = Arc::clone(guard.session());
    loop {
        let next = tokio::select! {
            next = guard.next_frame(heartbeat) => next,
            () = writer.closed() => {
                debug!(session_id = %session.id(), "streaming client went away");
                return;
            }
        };
        let frame = match next {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %session.id(), "stream ended: {e}");
                break;
            }
        };
        if let Err(e) = writer.write(frame_line(&frame).as_bytes()) {
            debug!(session_id = %session.id(), "stream write failed: {e}");
            return;
        }
        if frame.is_closing() {
            break;
        }
        if writer.payload_bytes() >= limit {
            info!(session_id = %session.id(), "stream reached {limit} bytes; closing response");
            break;
        }
    }
    drop(guard);
    if let Err(e) = writer.finish() {
        debug!(session_id = %session.id(), "stream finish failed: {e}");
    }
}

fn frame_line(frame: &Frame) -> String {
    format!("{}\n", frame.encode())
}

fn prelude() -> Vec<u8> {
    let mut prelude = vec![b'h'; PRELUDE_LEN];
    prelude.push(b'\n');
    prelude
}

fn stream_failure(err: StreamError) -> HttpError {
    HttpError::new(500, err.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
