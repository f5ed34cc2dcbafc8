//! Domain layer: sessions, the registry that owns them, and the events they
//! emit.
//!
//! Nothing here touches a socket.  Time comes from `tokio::time::Instant` so
//! tests can pause and advance the clock.

pub mod events;
pub mod registry;
pub mod session;

pub use events::SessionEvent;
pub use registry::SessionRegistry;
pub use session::{ReceiverGuard, Session, SessionError, SessionState};
