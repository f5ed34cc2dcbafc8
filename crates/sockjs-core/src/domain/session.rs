//! The per-client session state machine.
//!
//! A [`Session`] is one logical client connection.  It outlives any single
//! HTTP request: a polling client may issue hundreds of requests against the
//! same session id, and each one borrows the session only for its own
//! duration.
//!
//! # Lifecycle
//!
//! ```text
//!             first receiver          close()            next receiver
//! Connecting ─────────────────▶ Open ─────────▶ Closing ────────────────▶ Closed
//!     │        gets "o"                                    gets "c[..]"      ▲
//!     └──────────────────────── finalize() (idle expiry) ───────────────────┘
//! ```
//!
//! The opening frame is always the first frame a session delivers, even when
//! `close()` is called while it is still `Connecting`.
//!
//! # The single-receiver rule
//!
//! At most one request may be "the receiver" of a session at any instant.
//! [`Session::attach`] claims the slot and returns a [`ReceiverGuard`]; a
//! second attach while the guard is alive fails with
//! [`SessionError::ConcurrentReceive`] immediately.  The guard releases the
//! slot when dropped, which covers the case where the HTTP client disconnects
//! and the request future is dropped mid-wait.
//!
//! # Locking
//!
//! All mutable state sits behind one `parking_lot::Mutex` that is never held
//! across an `.await`.  A waiting receiver parks on a `tokio::sync::Notify`
//! instead, and is woken by `enqueue_outbound`, `close` or `finalize`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::domain::events::SessionEvent;
use crate::protocol::frame::{close, Frame};

/// Errors for operations attempted in the wrong lifecycle state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A receiver is already attached to this session.
    #[error("session {0}: another receiver is still attached")]
    ConcurrentReceive(String),

    /// The session is closed (or closing, for inbound/outbound traffic).
    #[error("session {0} is closed")]
    SessionClosed(String),

    /// A session with this id is already registered.
    #[error("session {0} already exists")]
    DuplicateSession(String),
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created; the opening frame has not been delivered yet.
    Connecting,
    /// Opening frame delivered; normal traffic.
    Open,
    /// Shutdown requested; the next receiver gets the closing frame.
    Closing,
    /// Terminal.
    Closed,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    outbound: VecDeque<String>,
    receiver_attached: bool,
    /// Set once the opening frame has been handed to a receiver.
    opened: bool,
    close_reason: Option<(u16, String)>,
    last_activity: Instant,
}

/// One logical client connection.
///
/// Sessions are created by [`crate::SessionRegistry::create`] and shared as
/// `Arc<Session>`.
#[derive(Debug)]
pub struct Session {
    id: String,
    inner: Mutex<Inner>,
    wake: Notify,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    pub(crate) fn new(id: impl Into<String>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(Inner {
                state: SessionState::Connecting,
                outbound: VecDeque::new(),
                receiver_attached: false,
                opened: false,
                close_reason: None,
                last_activity: Instant::now(),
            }),
            wake: Notify::new(),
            events,
        }
    }

    /// The client-supplied session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Time of the last attach, delivered frame, or inbound message.
    pub fn last_activity(&self) -> Instant {
        self.inner.lock().last_activity
    }

    /// Returns `true` while a [`ReceiverGuard`] is alive.
    pub fn has_receiver(&self) -> bool {
        self.inner.lock().receiver_attached
    }

    /// Number of outbound messages not yet delivered.
    pub fn pending_outbound(&self) -> usize {
        self.inner.lock().outbound.len()
    }

    /// Appends an application message to the outbound queue.
    ///
    /// Messages queued before the opening frame is delivered are sent right
    /// after it.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] once the session is `Closing` or
    /// `Closed`.
    pub fn enqueue_outbound(&self, text: impl Into<String>) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Closing | SessionState::Closed => {
                    return Err(SessionError::SessionClosed(self.id.clone()));
                }
                SessionState::Connecting | SessionState::Open => {
                    inner.outbound.push_back(text.into());
                }
            }
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Accepts one message sent by the client and forwards it to the
    /// application as a [`SessionEvent::Message`].
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] once the session is `Closing` or
    /// `Closed`; nothing is forwarded in that case.
    pub fn receive_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Closing | SessionState::Closed => {
                Err(SessionError::SessionClosed(self.id.clone()))
            }
            SessionState::Connecting | SessionState::Open => {
                inner.last_activity = Instant::now();
                // Sent under the lock so per-session order is preserved.
                self.emit(SessionEvent::Message {
                    session_id: self.id.clone(),
                    text: text.into(),
                });
                Ok(())
            }
        }
    }

    /// Requests shutdown.
    ///
    /// The session moves to `Closing`, pending outbound messages are dropped,
    /// and the next receiver (including one already waiting) is answered with
    /// the closing frame.  A session closed before its opening frame went
    /// out still delivers `o` first, then the closing frame to the receiver
    /// after that.  Closing an already-closing session keeps the first
    /// status and reason.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] if the session is already `Closed`.
    pub fn close(&self, status: u16, reason: impl Into<String>) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Closed => return Err(SessionError::SessionClosed(self.id.clone())),
                SessionState::Closing => return Ok(()),
                SessionState::Connecting | SessionState::Open => {
                    inner.state = SessionState::Closing;
                    inner.close_reason = Some((status, reason.into()));
                    inner.outbound.clear();
                }
            }
        }
        debug!(session_id = %self.id, status, "session closing");
        self.wake.notify_one();
        Ok(())
    }

    /// Claims the receiver slot.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionClosed`] if the session is `Closed`.
    /// - [`SessionError::ConcurrentReceive`] if another guard is alive.
    ///
    /// A failed attach leaves the session untouched.
    pub fn attach(self: &Arc<Self>) -> Result<ReceiverGuard, SessionError> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return Err(SessionError::SessionClosed(self.id.clone()));
        }
        if inner.receiver_attached {
            return Err(SessionError::ConcurrentReceive(self.id.clone()));
        }
        inner.receiver_attached = true;
        inner.last_activity = Instant::now();
        Ok(ReceiverGuard {
            session: Arc::clone(self),
        })
    }

    /// Moves the session straight to `Closed` without a closing frame.
    ///
    /// Returns `false` if it was already closed.
    pub(crate) fn finalize(&self) -> bool {
        let finalized = {
            let mut inner = self.inner.lock();
            self.finalize_locked(&mut inner)
        };
        if finalized {
            self.wake.notify_one();
        }
        finalized
    }

    /// Finalizes the session if it is idle past `idle_timeout` with no
    /// receiver attached.  Returns `true` if the registry should drop it;
    /// already-closed sessions are always dropped.
    pub(crate) fn expire_if_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return true;
        }
        if inner.receiver_attached
            || now.saturating_duration_since(inner.last_activity) <= idle_timeout
        {
            return false;
        }
        info!(session_id = %self.id, "session expired after {:?} idle", idle_timeout);
        self.finalize_locked(&mut inner)
    }

    fn finalize_locked(&self, inner: &mut Inner) -> bool {
        if inner.state == SessionState::Closed {
            return false;
        }
        let (status, reason) = inner
            .close_reason
            .take()
            .unwrap_or_else(|| (close::GO_AWAY, close::GO_AWAY_REASON.to_owned()));
        inner.state = SessionState::Closed;
        inner.outbound.clear();
        self.emit(SessionEvent::Closed {
            session_id: self.id.clone(),
            status,
            reason,
        });
        true
    }

    /// Produces the next frame if one is ready without waiting.
    fn take_ready_frame(&self) -> Result<Option<Frame>, SessionError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Connecting => {
                inner.state = SessionState::Open;
                Ok(Some(self.deliver_opening(&mut inner)))
            }
            SessionState::Open if inner.outbound.is_empty() => Ok(None),
            SessionState::Open => {
                inner.last_activity = Instant::now();
                let messages: Vec<String> = inner.outbound.drain(..).collect();
                Ok(Some(Frame::MessageArray(messages)))
            }
            // Closed before anyone received "o": it still goes out first.
            SessionState::Closing if !inner.opened => Ok(Some(self.deliver_opening(&mut inner))),
            SessionState::Closing => {
                let (status, reason) = inner
                    .close_reason
                    .clone()
                    .unwrap_or_else(|| (close::GO_AWAY, close::GO_AWAY_REASON.to_owned()));
                inner.last_activity = Instant::now();
                let frame = Frame::closing(status, reason);
                self.finalize_locked(&mut inner);
                info!(session_id = %self.id, "session closed");
                Ok(Some(frame))
            }
            SessionState::Closed => Err(SessionError::SessionClosed(self.id.clone())),
        }
    }

    fn deliver_opening(&self, inner: &mut Inner) -> Frame {
        inner.opened = true;
        inner.last_activity = Instant::now();
        info!(session_id = %self.id, "session opened");
        self.emit(SessionEvent::Opened {
            session_id: self.id.clone(),
        });
        Frame::Opening
    }

    fn touch(&self) {
        self.inner.lock().last_activity = Instant::now();
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(session_id = %self.id, "event receiver dropped; event discarded");
        }
    }
}

// ── Receiver guard ────────────────────────────────────────────────────────────

/// Proof that the holder is the session's single active receiver.
///
/// Dropping the guard releases the slot.
#[derive(Debug)]
pub struct ReceiverGuard {
    session: Arc<Session>,
}

impl ReceiverGuard {
    /// The session this guard is attached to.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Returns the next frame for this receiver.
    ///
    /// - `Connecting`: the opening frame, immediately.
    /// - `Open` with pending messages: all of them as one array frame.
    /// - `Open` with nothing pending: waits up to `heartbeat` for a message
    ///   or a close, then returns [`Frame::Heartbeat`].
    /// - `Closing`: the closing frame; the session becomes `Closed`.
    ///
    /// The wait does not block other sessions and is cancel-safe: dropping
    /// the future (and then the guard) loses no queued message.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] if the session was finalized.
    pub async fn next_frame(&self, heartbeat: Duration) -> Result<Frame, SessionError> {
        let deadline = Instant::now() + heartbeat;
        loop {
            if let Some(frame) = self.session.take_ready_frame()? {
                return Ok(frame);
            }
            // `notify_one` stores a permit when nobody is waiting, so a
            // message enqueued between the check above and this wait is not
            // missed.
            if timeout_at(deadline, self.session.wake.notified()).await.is_err() {
                if let Some(frame) = self.session.take_ready_frame()? {
                    return Ok(frame);
                }
                self.session.touch();
                return Ok(Frame::Heartbeat);
            }
        }
    }
}

impl Drop for ReceiverGuard {
    fn drop(&mut self) {
        let mut inner = self.session.inner.lock();
        inner.receiver_attached = false;
        inner.last_activity = Instant::now();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    const HEARTBEAT: Duration = Duration::from_secs(25);

    fn new_session() -> (Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Session::new("abc123", tx)), rx)
    }

    async fn open(session: &Arc<Session>) {
        let guard = session.attach().unwrap();
        assert_eq!(guard.next_frame(HEARTBEAT).await.unwrap(), Frame::Opening);
    }

    #[tokio::test]
    async fn test_new_session_is_connecting() {
        let (session, _rx) = new_session();
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.id(), "abc123");
        assert!(!session.has_receiver());
    }

    #[tokio::test]
    async fn test_first_frame_is_opening_and_emits_opened() {
        // Arrange
        let (session, mut rx) = new_session();

        // Act
        open(&session).await;

        // Assert
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Opened {
                session_id: "abc123".into()
            }
        );
    }

    #[tokio::test]
    async fn test_opening_frame_delivered_once() {
        // Arrange
        let (session, _rx) = new_session();
        open(&session).await;
        session.enqueue_outbound("next").unwrap();

        // Act: the second receiver must not see another "o"
        let guard = session.attach().unwrap();
        let frame = guard.next_frame(HEARTBEAT).await.unwrap();

        // Assert
        assert_eq!(frame, Frame::MessageArray(vec!["next".into()]));
    }

    #[tokio::test]
    async fn test_messages_queued_while_connecting_follow_opening() {
        let (session, _rx) = new_session();
        session.enqueue_outbound("early").unwrap();

        open(&session).await;
        let guard = session.attach().unwrap();

        assert_eq!(
            guard.next_frame(HEARTBEAT).await.unwrap(),
            Frame::MessageArray(vec!["early".into()])
        );
    }

    #[tokio::test]
    async fn test_pending_messages_drain_as_one_array_in_fifo_order() {
        // Arrange
        let (session, _rx) = new_session();
        open(&session).await;
        session.enqueue_outbound("hi").unwrap();
        session.enqueue_outbound("there").unwrap();

        // Act
        let guard = session.attach().unwrap();
        let frame = guard.next_frame(HEARTBEAT).await.unwrap();

        // Assert
        assert_eq!(frame, Frame::MessageArray(vec!["hi".into(), "there".into()]));
        assert_eq!(session.pending_outbound(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_receiver_gets_heartbeat_after_interval() {
        // Arrange
        let (session, _rx) = new_session();
        open(&session).await;
        let guard = session.attach().unwrap();
        let started = Instant::now();

        // Act
        let frame = guard.next_frame(HEARTBEAT).await.unwrap();

        // Assert
        assert_eq!(frame, Frame::Heartbeat);
        assert!(started.elapsed() >= HEARTBEAT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_receiver_is_woken_by_enqueue() {
        // Arrange
        let (session, _rx) = new_session();
        open(&session).await;
        let guard = session.attach().unwrap();
        let mut waiting = task::spawn(guard.next_frame(HEARTBEAT));
        assert_pending!(waiting.poll());

        // Act
        session.enqueue_outbound("wake up").unwrap();

        // Assert
        assert!(waiting.is_woken());
        let frame = assert_ready!(waiting.poll()).unwrap();
        assert_eq!(frame, Frame::MessageArray(vec!["wake up".into()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_receiver_is_woken_by_close() {
        // Arrange
        let (session, _rx) = new_session();
        open(&session).await;
        let guard = session.attach().unwrap();
        let mut waiting = task::spawn(guard.next_frame(HEARTBEAT));
        assert_pending!(waiting.poll());

        // Act
        session.close(3000, "Go away!").unwrap();

        // Assert: the wait is cut short with the closing frame
        let frame = assert_ready!(waiting.poll()).unwrap();
        assert_eq!(frame, Frame::closing(3000, "Go away!"));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_second_attach_fails_with_concurrent_receive() {
        // Arrange
        let (session, _rx) = new_session();
        let _first = session.attach().unwrap();

        // Act
        let second = session.attach();

        // Assert
        assert_eq!(
            second.unwrap_err(),
            SessionError::ConcurrentReceive("abc123".into())
        );
        // The failed attach must not disturb the session.
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.has_receiver());
    }

    #[tokio::test]
    async fn test_dropping_guard_releases_receiver_slot() {
        let (session, _rx) = new_session();
        let guard = session.attach().unwrap();
        drop(guard);

        assert!(!session.has_receiver());
        assert!(session.attach().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_releases_slot_and_keeps_queue() {
        // Arrange: a receiver starts waiting, then its request is dropped
        let (session, _rx) = new_session();
        open(&session).await;
        {
            let guard = session.attach().unwrap();
            let mut waiting = task::spawn(guard.next_frame(HEARTBEAT));
            assert_pending!(waiting.poll());
        }

        // Act
        session.enqueue_outbound("after disconnect").unwrap();
        let guard = session.attach().unwrap();

        // Assert
        assert_eq!(
            guard.next_frame(HEARTBEAT).await.unwrap(),
            Frame::MessageArray(vec!["after disconnect".into()])
        );
    }

    #[tokio::test]
    async fn test_close_yields_one_closing_frame_then_session_closed() {
        // Arrange
        let (session, mut rx) = new_session();
        open(&session).await;
        let _ = rx.try_recv();
        session.close(3001, "bye").unwrap();

        // Act
        let guard = session.attach().unwrap();
        let frame = guard.next_frame(HEARTBEAT).await.unwrap();
        drop(guard);

        // Assert
        assert_eq!(frame, Frame::closing(3001, "bye"));
        assert_eq!(
            session.attach().unwrap_err(),
            SessionError::SessionClosed("abc123".into())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Closed {
                session_id: "abc123".into(),
                status: 3001,
                reason: "bye".into()
            }
        );
    }

    #[tokio::test]
    async fn test_close_discards_pending_outbound() {
        let (session, _rx) = new_session();
        open(&session).await;
        session.enqueue_outbound("never sent").unwrap();

        session.close(3000, "Go away!").unwrap();

        assert_eq!(session.pending_outbound(), 0);
        let guard = session.attach().unwrap();
        assert!(guard.next_frame(HEARTBEAT).await.unwrap().is_closing());
    }

    #[tokio::test]
    async fn test_second_close_keeps_first_reason() {
        let (session, _rx) = new_session();
        open(&session).await;
        session.close(3000, "first").unwrap();
        session.close(4000, "second").unwrap();

        let guard = session.attach().unwrap();
        assert_eq!(
            guard.next_frame(HEARTBEAT).await.unwrap(),
            Frame::closing(3000, "first")
        );
    }

    #[tokio::test]
    async fn test_close_before_open_still_delivers_opening_frame_first() {
        // Arrange: closed while nobody has received anything yet
        let (session, mut rx) = new_session();
        session.close(3000, "Go away!").unwrap();

        // Act
        let first = {
            let guard = session.attach().unwrap();
            guard.next_frame(HEARTBEAT).await.unwrap()
        };
        let state_between = session.state();
        let second = {
            let guard = session.attach().unwrap();
            guard.next_frame(HEARTBEAT).await.unwrap()
        };

        // Assert
        assert_eq!(first, Frame::Opening);
        assert_eq!(state_between, SessionState::Closing);
        assert_eq!(second, Frame::closing(3000, "Go away!"));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Opened {
                session_id: "abc123".into()
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::Closed { .. }));
    }

    #[tokio::test]
    async fn test_close_on_closed_session_fails() {
        let (session, _rx) = new_session();
        assert!(session.finalize());
        assert_eq!(
            session.close(3000, "x").unwrap_err(),
            SessionError::SessionClosed("abc123".into())
        );
    }

    #[tokio::test]
    async fn test_enqueue_after_close_fails() {
        let (session, _rx) = new_session();
        session.close(3000, "Go away!").unwrap();
        assert!(matches!(
            session.enqueue_outbound("late"),
            Err(SessionError::SessionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_message_forwards_in_order() {
        // Arrange
        let (session, mut rx) = new_session();
        open(&session).await;
        let _ = rx.try_recv();

        // Act
        session.receive_message("one").unwrap();
        session.receive_message("two").unwrap();

        // Assert
        for expected in ["one", "two"] {
            assert_eq!(
                rx.try_recv().unwrap(),
                SessionEvent::Message {
                    session_id: "abc123".into(),
                    text: expected.into()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_receive_message_on_closed_session_fails_and_forwards_nothing() {
        let (session, mut rx) = new_session();
        session.finalize();
        let _ = rx.try_recv();

        let result = session.receive_message("dropped");

        assert!(matches!(result, Err(SessionError::SessionClosed(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let (session, mut rx) = new_session();
        assert!(session.finalize());
        assert!(!session.finalize());

        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Closed { status: 3000, .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_if_idle_respects_timeout_and_receiver() {
        // Arrange
        let (session, _rx) = new_session();
        let idle = Duration::from_secs(5);

        // Act / Assert: fresh session is not expired
        assert!(!session.expire_if_idle(Instant::now(), idle));

        // An attached receiver keeps it alive regardless of age.
        let guard = session.attach().unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!session.expire_if_idle(Instant::now(), idle));
        drop(guard);

        // Released, then idle past the timeout.
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(session.expire_if_idle(Instant::now(), idle));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_session_error_messages() {
        assert_eq!(
            SessionError::DuplicateSession("x".into()).to_string(),
            "session x already exists"
        );
        assert_eq!(
            SessionError::SessionClosed("x".into()).to_string(),
            "session x is closed"
        );
    }
}
