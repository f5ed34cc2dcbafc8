//! One HTTP/1.1 connection: read requests, hand them to the service, write
//! replies.
//!
//! # Wire handling
//!
//! - Request heads are parsed with `httparse`; bodies must carry
//!   `Content-Length` (chunked request bodies are rejected with `411`).
//! - Full replies are written with `Content-Length` and the connection is
//!   kept alive unless the client asked otherwise.
//! - Streaming replies are written with `Transfer-Encoding: chunked`; the
//!   body bytes arrive pre-framed from the chunked adapter and are copied
//!   verbatim.  The connection closes when the stream finishes.
//!
//! While a request is being handled, and while a streaming reply is idle, the
//! socket is also watched for EOF.  A client that hangs up mid long-poll has
//! its handler future dropped, which releases the session receiver at once
//! instead of at the next heartbeat.  Bytes that arrive meanwhile are kept
//! as the start of the next pipelined request.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::{Buf, BytesMut};
use sockjs_core::{ChunkEvent, ChunkedReader};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::application::SockJsService;
use crate::domain::http::{content_type, reason_phrase, HttpRequest, HttpResponse, Method, Reply};

/// Largest accepted request head.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const MAX_HEADERS: usize = 64;

/// A parsed request head plus the framing facts the connection loop needs.
#[derive(Debug)]
pub struct ParsedHead {
    pub request: HttpRequest,
    /// Bytes of `buf` occupied by the head.
    pub head_len: usize,
    pub content_length: usize,
    pub keep_alive: bool,
}

/// Why a request could not be read; each maps to a status code.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("request head too large")]
    HeadTooLarge,
    #[error("request body too large")]
    BodyTooLarge,
    #[error("chunked request bodies are not supported")]
    LengthRequired,
}

impl RequestError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Malformed(_) => 400,
            Self::HeadTooLarge => 431,
            Self::BodyTooLarge => 413,
            Self::LengthRequired => 411,
        }
    }
}

/// Parses a request head from the start of `buf`.
///
/// Returns `Ok(None)` while the head is incomplete.
///
/// # Errors
///
/// [`RequestError`] for heads that can never become valid.
pub fn parse_head(buf: &[u8]) -> Result<Option<ParsedHead>, RequestError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let head_len = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) if buf.len() > MAX_HEAD_BYTES => {
            return Err(RequestError::HeadTooLarge)
        }
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(RequestError::Malformed(e.to_string())),
    };

    let method = Method::parse(parsed.method.unwrap_or_default());
    let mut request = HttpRequest::new(method, parsed.path.unwrap_or("/"));
    for header in parsed.headers.iter() {
        request.headers.push((
            header.name.to_owned(),
            String::from_utf8_lossy(header.value).into_owned(),
        ));
    }

    if request
        .header("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
    {
        return Err(RequestError::LengthRequired);
    }
    let content_length = match request.header("content-length") {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed(format!("bad Content-Length '{value}'")))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::BodyTooLarge);
    }

    let connection = request.header("connection").map(str::to_ascii_lowercase);
    let keep_alive = match parsed.version {
        Some(1) => connection.as_deref() != Some("close"),
        _ => connection.as_deref() == Some("keep-alive"),
    };

    Ok(Some(ParsedHead {
        request,
        head_len,
        content_length,
        keep_alive,
    }))
}

/// Serves `stream` until the client closes it or a reply ends it.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, service: Arc<SockJsService>) {
    match serve(stream, &service).await {
        Ok(()) => debug!("connection {peer} closed"),
        Err(e) => warn!("connection {peer} closed with error: {e:#}"),
    }
}

async fn serve(mut stream: TcpStream, service: &SockJsService) -> anyhow::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let head = match read_request(&mut stream, &mut buf).await {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(()),
            Err(ReadError::Io(e)) => return Err(e),
            Err(ReadError::Request(e)) => {
                let response =
                    HttpResponse::with_body(e.status(), content_type::PLAIN, e.to_string());
                write_full(&mut stream, &response, false).await?;
                return Ok(());
            }
        };

        let Some(reply) = handle_or_hang_up(&mut stream, &mut buf, service, head.request).await
        else {
            debug!("client hung up while its request was pending");
            return Ok(());
        };

        match reply {
            Reply::Full(response) => {
                write_full(&mut stream, &response, head.keep_alive).await?;
                if !head.keep_alive {
                    return Ok(());
                }
            }
            Reply::Streaming(reader) => {
                write_streaming(&mut stream, reader).await?;
                return Ok(());
            }
        }
    }
}

/// Runs the handler while watching the socket.  Returns `None` if the client
/// closed the connection first; the handler future is dropped with it.
async fn handle_or_hang_up(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    service: &SockJsService,
    request: HttpRequest,
) -> Option<Reply> {
    let handling = service.handle(request);
    tokio::pin!(handling);
    loop {
        tokio::select! {
            reply = &mut handling => return Some(reply),
            read = stream.read_buf(buf), if buf.len() < MAX_HEAD_BYTES + MAX_BODY_BYTES => {
                match read {
                    Ok(0) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
        }
    }
}

enum ReadError {
    Io(anyhow::Error),
    Request(RequestError),
}

/// Reads one complete request.  `Ok(None)` means the client closed the
/// connection cleanly between requests.
async fn read_request(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> Result<Option<ParsedHead>, ReadError> {
    let mut head = loop {
        if let Some(head) = parse_head(buf).map_err(ReadError::Request)? {
            break head;
        }
        if fill(stream, buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ReadError::Io(anyhow::anyhow!(
                "connection closed mid-request"
            )));
        }
    };

    let total = head.head_len + head.content_length;
    while buf.len() < total {
        if fill(stream, buf).await? == 0 {
            return Err(ReadError::Io(anyhow::anyhow!("connection closed mid-body")));
        }
    }
    buf.advance(head.head_len);
    head.request.body = buf.split_to(head.content_length).freeze();
    Ok(Some(head))
}

async fn fill(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<usize, ReadError> {
    stream
        .read_buf(buf)
        .await
        .context("socket read failed")
        .map_err(ReadError::Io)
}

/// Serializes a status line and header block, terminated by the blank line.
pub fn encode_head(status: u16, headers: &[(String, String)], framing: &[(&str, String)]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {}\r\n", reason_phrase(status));
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    for (name, value) in framing {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.into_bytes()
}

async fn write_full(
    stream: &mut TcpStream,
    response: &HttpResponse,
    keep_alive: bool,
) -> anyhow::Result<()> {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    let head = encode_head(
        response.status,
        &response.headers,
        &[
            ("Content-Length", response.content_length().to_string()),
            ("Connection", connection.to_string()),
        ],
    );
    stream.write_all(&head).await.context("failed to write response head")?;
    stream
        .write_all(&response.body)
        .await
        .context("failed to write response body")?;
    stream.flush().await.context("failed to flush response")?;
    Ok(())
}

/// Copies a streaming reply onto the socket until the producer finishes or
/// the client hangs up.
async fn write_streaming(stream: &mut TcpStream, mut reader: ChunkedReader) -> anyhow::Result<()> {
    let (mut rd, mut wr) = stream.split();
    let mut scratch = [0u8; 512];
    loop {
        let event = tokio::select! {
            event = reader.next_event() => event,
            read = rd.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    debug!("streaming client hung up");
                    return Ok(());
                }
                // Pipelined bytes on a streaming connection are ignored.
                Ok(_) => continue,
            },
        };
        match event {
            Some(ChunkEvent::Head(head)) => {
                let bytes = encode_head(
                    head.status,
                    &head.headers,
                    &[
                        ("Transfer-Encoding", "chunked".to_string()),
                        ("Connection", "close".to_string()),
                    ],
                );
                wr.write_all(&bytes).await.context("failed to write stream head")?;
            }
            Some(ChunkEvent::Data(bytes)) => {
                wr.write_all(&bytes).await.context("failed to write chunk")?;
                wr.flush().await.context("failed to flush chunk")?;
            }
            Some(ChunkEvent::Finished) => return Ok(()),
            None => bail!("stream producer stopped without finishing"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
