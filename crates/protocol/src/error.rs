//! Server-side operation errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors the ensemble (or the wire client) reports for individual
/// operations. The session layer passes these through verbatim; they never
/// feed back into the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ZkError {
    #[error("node does not exist")]
    NoNode,
    #[error("node already exists")]
    NodeExists,
    #[error("version conflict")]
    BadVersion,
    #[error("node has children")]
    NotEmpty,
    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals,
    #[error("not authenticated")]
    NoAuth,
    #[error("authentication failed")]
    AuthFailed,
    #[error("invalid ACL")]
    InvalidAcl,
    #[error("invalid arguments")]
    BadArguments,
    #[error("connection to the ensemble was lost")]
    ConnectionLoss,
    #[error("session expired")]
    SessionExpired,
    #[error("session moved to another server")]
    SessionMoved,
    #[error("operation timed out")]
    OperationTimeout,
    #[error("error while marshalling or unmarshalling data")]
    Marshalling,
    #[error("operation is unimplemented")]
    Unimplemented,
    #[error("server error {0}")]
    Server(i32),
}

impl ZkError {
    /// Wire error code, matching the server's error table.
    pub fn code(&self) -> i32 {
        match self {
            ZkError::Server(code) => *code,
            ZkError::ConnectionLoss => -4,
            ZkError::Marshalling => -5,
            ZkError::Unimplemented => -6,
            ZkError::OperationTimeout => -7,
            ZkError::BadArguments => -8,
            ZkError::NoNode => -101,
            ZkError::NoAuth => -102,
            ZkError::BadVersion => -103,
            ZkError::NoChildrenForEphemerals => -108,
            ZkError::NodeExists => -110,
            ZkError::NotEmpty => -111,
            ZkError::SessionExpired => -112,
            ZkError::InvalidAcl => -114,
            ZkError::AuthFailed => -115,
            ZkError::SessionMoved => -118,
        }
    }

    /// Maps a wire error code to an error value. Unknown codes become
    /// [`ZkError::Server`].
    pub fn from_code(code: i32) -> Self {
        match code {
            -4 => ZkError::ConnectionLoss,
            -5 => ZkError::Marshalling,
            -6 => ZkError::Unimplemented,
            -7 => ZkError::OperationTimeout,
            -8 => ZkError::BadArguments,
            -101 => ZkError::NoNode,
            -102 => ZkError::NoAuth,
            -103 => ZkError::BadVersion,
            -108 => ZkError::NoChildrenForEphemerals,
            -110 => ZkError::NodeExists,
            -111 => ZkError::NotEmpty,
            -112 => ZkError::SessionExpired,
            -114 => ZkError::InvalidAcl,
            -115 => ZkError::AuthFailed,
            -118 => ZkError::SessionMoved,
            other => ZkError::Server(other),
        }
    }
}
