//! Access-control entries attached to nodes.

use serde::{Deserialize, Serialize};

/// Permission bits, combinable with `|`.
pub const PERM_READ: u32 = 1 << 0;
pub const PERM_WRITE: u32 = 1 << 1;
pub const PERM_CREATE: u32 = 1 << 2;
pub const PERM_DELETE: u32 = 1 << 3;
pub const PERM_ADMIN: u32 = 1 << 4;
pub const PERM_ALL: u32 = PERM_READ | PERM_WRITE | PERM_CREATE | PERM_DELETE | PERM_ADMIN;

/// One access-control entry: a permission mask granted to an identity under
/// an authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub perms: u32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    pub fn new(perms: u32, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            perms,
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// Grants `perms` to anyone. The conventional default for open nodes.
    pub fn world(perms: u32) -> Vec<Acl> {
        vec![Acl::new(perms, "world", "anyone")]
    }

    /// Grants everything to the authenticated creator of the node.
    pub fn creator_all() -> Vec<Acl> {
        vec![Acl::new(PERM_ALL, "auth", "")]
    }
}
