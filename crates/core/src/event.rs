//! High-level lifecycle events emitted by the session loop.

use std::fmt;

/// What a session subscriber observes.
///
/// `Closed` and `Failed` are terminal: once either is delivered, no further
/// event will ever follow for that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The session was closed, normally as a direct result of calling
    /// [`Session::close`](crate::Session::close). Terminal.
    Closed,
    /// The connection to the ensemble was lost. The wire client is retrying
    /// on its own and another event follows once it resolves. In the
    /// meantime, assume any lock or lease held through this session is gone.
    Disconnected,
    /// The connection was re-established before the session timed out.
    /// Ephemeral nodes created by this session still exist.
    Reconnected,
    /// The connection was re-established, but only after the server expired
    /// the session. Every ephemeral node owned by the session was purged and
    /// must be recreated.
    ExpiredReconnected,
    /// The session failed unrecoverably: bad credentials, broken quorum, or
    /// a redial after expiry that itself failed. Terminal; the session must
    /// be reconstructed.
    Failed,
}

impl SessionEvent {
    /// True for events after which the session loop has exited for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionEvent::Closed | SessionEvent::Failed)
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::Closed => "closed",
            SessionEvent::Disconnected => "disconnected",
            SessionEvent::Reconnected => "reconnected",
            SessionEvent::ExpiredReconnected => "expired-reconnected",
            SessionEvent::Failed => "failed",
        };
        f.write_str(name)
    }
}
