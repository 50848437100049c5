//! Connection-state signals and session identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw connection-state signal reported by the underlying client.
///
/// These are the low-level states a ZooKeeper connection moves through.
/// They carry no session semantics on their own; the session layer folds
/// them into lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnState {
    /// The client is (re)establishing a connection to some server in the
    /// ensemble. The client retries this on its own.
    Connecting,
    /// Intermediate protocol phase between connect and session handshake.
    Associating,
    /// A connection is established and the session is live.
    Connected,
    /// The server pronounced the logical session expired. Ephemeral nodes
    /// owned by the session are gone; a fresh dial is required.
    Expired,
    /// Authentication was rejected. Unrecoverable.
    AuthFailed,
    /// The connection was closed, normally as a result of `close()`.
    Closed,
}

impl ConnState {
    /// Wire code for this state, as reported by the C client.
    pub fn code(self) -> i32 {
        match self {
            ConnState::Closed => 0,
            ConnState::Connecting => 1,
            ConnState::Associating => 2,
            ConnState::Connected => 3,
            ConnState::Expired => -112,
            ConnState::AuthFailed => -113,
        }
    }

    /// Maps a wire state code back to a signal, if known.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ConnState::Closed),
            1 => Some(ConnState::Connecting),
            2 => Some(ConnState::Associating),
            3 => Some(ConnState::Connected),
            -112 => Some(ConnState::Expired),
            -113 => Some(ConnState::AuthFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnState::Connecting => "connecting",
            ConnState::Associating => "associating",
            ConnState::Connected => "connected",
            ConnState::Expired => "expired",
            ConnState::AuthFailed => "auth-failed",
            ConnState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Opaque identity of a logical session, issued by the ensemble.
///
/// Handing this back on a later dial resumes the prior session, keeping its
/// ephemeral nodes, as long as the session has not timed out server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId {
    /// Server-assigned session id.
    pub id: i64,
    /// Session password, required to resume.
    pub passwd: Vec<u8>,
}

impl SessionId {
    pub fn new(id: i64, passwd: Vec<u8>) -> Self {
        Self { id, passwd }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Password bytes stay out of logs.
        write!(f, "{:#x}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_round_trip() {
        for state in [
            ConnState::Connecting,
            ConnState::Associating,
            ConnState::Connected,
            ConnState::Expired,
            ConnState::AuthFailed,
            ConnState::Closed,
        ] {
            assert_eq!(ConnState::from_code(state.code()), Some(state));
        }
        assert_eq!(ConnState::from_code(42), None);
    }

    #[test]
    fn session_id_display_hides_password() {
        let id = SessionId::new(0x1234, b"secret".to_vec());
        let shown = id.to_string();
        assert_eq!(shown, "0x1234");
        assert!(!shown.contains("secret"));
    }
}
