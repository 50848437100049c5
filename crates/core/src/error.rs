//! Session-level errors.
//!
//! Only construction can fail with a [`SessionError`]. Everything that goes
//! wrong after construction is reported either as a lifecycle event on the
//! subscription channel or as a verbatim [`zk_protocol::ZkError`] from a
//! pass-through data operation.

use thiserror::Error;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The initial connection to the ensemble could not be established.
    /// The counterpart of the `Failed` event, surfaced synchronously because
    /// construction has not returned yet.
    #[error("unable to connect to ZooKeeper")]
    NotConnected,
}
