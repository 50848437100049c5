//! Wire types for the ZooKeeper client protocol.
//!
//! This crate contains the plain data types exchanged with (or reported by)
//! the underlying ZooKeeper client: connection-state signals, node metadata,
//! ACLs, watch events, and the server-side error taxonomy.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond (de)serialization and display
//! * 1:1 with protocol: State and error values carry the wire codes
//! * Stable: Changes only when the wire protocol changes
//!
//! The session layer with lifecycle semantics is built on top of these
//! types in `zk-session`.

pub mod acl;
pub mod error;
pub mod state;
pub mod types;

pub use acl::*;
pub use error::*;
pub use state::*;
pub use types::*;
