//! Resilient session management for a ZooKeeper-like ensemble.
//!
//! This crate keeps a long-lived logical session alive on behalf of a client
//! process. It consumes the raw connection-state signals of an underlying
//! wire client (the [`Connector`]/[`Transport`] seam), folds them into a
//! small set of [`SessionEvent`] lifecycle events, redials with the last
//! known resumption token when the server expires the session, and fans the
//! events out to registered subscribers in order.
//!
//! # Lifecycle
//!
//! A [`Session`] is created by [`Session::connect`] (or
//! [`Session::resume`] / [`Session::with_options`]), which blocks until the
//! first connection attempt resolves and then starts a dedicated processing
//! loop. The loop runs until it emits a terminal event ([`SessionEvent`]
//! `Closed` or `Failed`); after that the session is permanently unusable and
//! must be reconstructed.
//!
//! # Subscribers
//!
//! Lifecycle events are delivered to every sink registered with
//! [`Session::subscribe`], in registration order, with blocking sends. A
//! slow or unbuffered sink stalls the whole session loop; subscribers must
//! buffer or consume promptly.
//!
//! # Example
//!
//! ```ignore
//! let cluster = FakeCluster::new();
//! let session = Session::connect(
//!     vec!["zk1:2181".into(), "zk2:2181".into()],
//!     DEFAULT_RECV_TIMEOUT,
//!     cluster.connector(),
//! )
//! .await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(16);
//! session.subscribe(tx).await;
//!
//! let stat = session.create("/lock", b"".to_vec(), CreateMode::Ephemeral, Acl::world(PERM_ALL)).await?;
//! while let Some(event) = rx.recv().await {
//!     if event == SessionEvent::ExpiredReconnected {
//!         // all ephemeral state is gone; recreate it
//!     }
//! }
//! ```

pub mod error;
pub mod event;
pub mod fake_transport;
mod manager;
pub mod options;
pub mod session;
mod subscribers;
pub mod transport;

pub use error::{Result, SessionError};
pub use event::SessionEvent;
pub use options::{DEFAULT_RECV_TIMEOUT, SessionOptions, SessionOptionsBuilder};
pub use session::Session;
pub use transport::{ChangeFn, Connector, SignalStream, Transport};

pub use zk_protocol as protocol;
