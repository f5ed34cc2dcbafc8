//! HTTP/1.1 chunked-transfer adapter for long-lived streaming responses.
//!
//! A streaming transport holds one response open and pushes many frames down
//! it.  Most server models expect a handler to return one finished body, so
//! this module splits the response into two halves joined by a channel:
//!
//! ```text
//! transport task                          connection task
//! ──────────────                          ───────────────
//! ChunkedWriter::open(200, headers) ──▶  Head   → status line + headers
//! ChunkedWriter::write(b"ab")       ──▶  Data   → "2\r\nab\r\n"
//! ChunkedWriter::write(b"cd")       ──▶  Data   → "2\r\ncd\r\n"
//! ChunkedWriter::finish()           ──▶  Data   → "0\r\n\r\n", then Finished
//! ```
//!
//! The writer never waits for the reader: events are buffered in an
//! unbounded channel and delivered in call order whenever the connection
//! task gets around to draining them.
//!
//! # Chunk format (RFC 9112 §7.1)
//!
//! Each chunk is the payload length in hexadecimal, CRLF, the payload bytes,
//! CRLF.  A zero-length chunk terminates the body, which is why an empty
//! `write` emits nothing at all.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;

/// Line terminator used by the chunked coding.
pub const CRLF: &[u8] = b"\r\n";

/// The terminal zero-length chunk.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Errors returned by [`ChunkedWriter`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// `open` was called a second time.
    #[error("response status and headers were already sent")]
    ResponseAlreadyStarted,

    /// `write` or `finish` was called after `finish`.
    #[error("response body was already finished")]
    ResponseAlreadyFinished,

    /// `write` or `finish` was called before `open`.
    #[error("response has not been started")]
    ResponseNotStarted,

    /// The connection side dropped its reader (client went away).
    #[error("response consumer is gone")]
    ConsumerGone,
}

/// Status and headers committed by [`ChunkedWriter::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

/// One step of a streamed response, as seen by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    /// Status line and headers; always the first event.
    Head(ResponseHead),
    /// Bytes already framed with the chunked coding.
    Data(Bytes),
    /// The terminal chunk has been sent; no more events follow.
    Finished,
}

/// Creates a connected writer/reader pair.
pub fn chunked_channel() -> (ChunkedWriter, ChunkedReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChunkedWriter {
            tx,
            started: false,
            finished: false,
            payload_bytes: 0,
        },
        ChunkedReader { rx },
    )
}

/// Frames `data` as one chunk.
pub fn encode_chunk(data: &[u8]) -> Bytes {
    let size_line = format!("{:x}", data.len());
    let mut buf = BytesMut::with_capacity(size_line.len() + data.len() + 2 * CRLF.len());
    buf.put_slice(size_line.as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(data);
    buf.put_slice(CRLF);
    buf.freeze()
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Producer half: commits the head once, then writes chunks, then finishes.
///
/// `ChunkedWriter` is `Send`, so it can be moved into whatever task produces
/// the body, independently of the task that opened the response.
#[derive(Debug)]
pub struct ChunkedWriter {
    tx: mpsc::UnboundedSender<ChunkEvent>,
    started: bool,
    finished: bool,
    payload_bytes: usize,
}

impl ChunkedWriter {
    /// Commits the response status and headers.
    ///
    /// # Errors
    ///
    /// - [`StreamError::ResponseAlreadyStarted`] on a second call.
    /// - [`StreamError::ConsumerGone`] if the reader was dropped.
    pub fn open(&mut self, status: u16, headers: Vec<(String, String)>) -> Result<(), StreamError> {
        if self.started {
            return Err(StreamError::ResponseAlreadyStarted);
        }
        self.send(ChunkEvent::Head(ResponseHead { status, headers }))?;
        self.started = true;
        Ok(())
    }

    /// Sends `chunk` as one HTTP chunk.  Empty input sends nothing.
    ///
    /// # Errors
    ///
    /// - [`StreamError::ResponseAlreadyFinished`] after [`finish`](Self::finish).
    /// - [`StreamError::ResponseNotStarted`] before [`open`](Self::open).
    /// - [`StreamError::ConsumerGone`] if the reader was dropped.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), StreamError> {
        self.check_writable()?;
        if chunk.is_empty() {
            return Ok(());
        }
        self.send(ChunkEvent::Data(encode_chunk(chunk)))?;
        self.payload_bytes += chunk.len();
        Ok(())
    }

    /// Sends the terminal chunk and marks the response complete.
    ///
    /// # Errors
    ///
    /// Same conditions as [`write`](Self::write).
    pub fn finish(&mut self) -> Result<(), StreamError> {
        self.check_writable()?;
        self.finished = true;
        self.send(ChunkEvent::Data(Bytes::from_static(LAST_CHUNK)))?;
        self.send(ChunkEvent::Finished)
    }

    /// Total payload bytes written so far, excluding chunk framing.
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Returns `true` once [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Resolves once the reader has been dropped.
    ///
    /// Lets a producer that is waiting for its next chunk stop early instead
    /// of discovering the disconnect on its next `write`.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    fn check_writable(&self) -> Result<(), StreamError> {
        if self.finished {
            Err(StreamError::ResponseAlreadyFinished)
        } else if !self.started {
            Err(StreamError::ResponseNotStarted)
        } else {
            Ok(())
        }
    }

    fn send(&self, event: ChunkEvent) -> Result<(), StreamError> {
        self.tx.send(event).map_err(|_| StreamError::ConsumerGone)
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Consumer half, drained by the connection layer.
#[derive(Debug)]
pub struct ChunkedReader {
    rx: mpsc::UnboundedReceiver<ChunkEvent>,
}

/// Everything a [`ChunkedReader`] produced, gathered by
/// [`ChunkedReader::read_to_end`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedBody {
    pub head: Option<ResponseHead>,
    /// Concatenated, still chunk-framed body bytes.
    pub body: Vec<u8>,
    /// `true` if the writer called `finish` (as opposed to being dropped).
    pub finished: bool,
}

impl ChunkedReader {
    /// Waits for the next event.  `None` means the writer was dropped.
    pub async fn next_event(&mut self) -> Option<ChunkEvent> {
        self.rx.recv().await
    }

    /// Drains every event until the writer finishes or is dropped.
    pub async fn read_to_end(mut self) -> CollectedBody {
        let mut collected = CollectedBody {
            head: None,
            body: Vec::new(),
            finished: false,
        };
        while let Some(event) = self.next_event().await {
            match event {
                ChunkEvent::Head(head) => collected.head = Some(head),
                ChunkEvent::Data(bytes) => collected.body.extend_from_slice(&bytes),
                ChunkEvent::Finished => {
                    collected.finished = true;
                    break;
                }
            }
        }
        collected
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
