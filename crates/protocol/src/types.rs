//! Node metadata, create modes, and watch events.

use serde::{Deserialize, Serialize};

/// Metadata attached to every node, returned by most read operations.
///
/// Field names follow the server's stat structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Zxid of the transaction that created the node.
    pub czxid: i64,
    /// Zxid of the transaction that last modified the node.
    pub mzxid: i64,
    /// Creation time, milliseconds since epoch.
    pub ctime: i64,
    /// Last-modification time, milliseconds since epoch.
    pub mtime: i64,
    /// Number of changes to the node's data.
    pub version: i32,
    /// Number of changes to the node's children.
    pub cversion: i32,
    /// Number of changes to the node's ACL.
    pub aversion: i32,
    /// Owning session id when the node is ephemeral, zero otherwise.
    pub ephemeral_owner: i64,
    /// Length of the node's data in bytes.
    pub data_length: i32,
    /// Number of children.
    pub num_children: i32,
    /// Zxid of the transaction that last modified the node's children.
    pub pzxid: i64,
}

impl Stat {
    /// True when the node is owned by some session's lifetime.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}

/// How a node is created: whether it dies with its session, and whether the
/// server appends a monotonically increasing suffix to its name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateMode {
    #[default]
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }

    /// Wire flag bits: 1 = ephemeral, 2 = sequence.
    pub fn flags(self) -> i32 {
        let mut flags = 0;
        if self.is_ephemeral() {
            flags |= 1;
        }
        if self.is_sequential() {
            flags |= 2;
        }
        flags
    }
}

/// Kind of change a one-shot watch fired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// A one-shot watch notification: which node changed and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

impl WatchedEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}
