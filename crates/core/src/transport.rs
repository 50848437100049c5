//! Seams to the underlying wire client.
//!
//! The wire protocol itself (dialing, framing, the auth handshake) is out of
//! scope for this crate. It plugs in through two object-safe traits:
//! [`Connector`] establishes connections, [`Transport`] is one established
//! connection. The session layer owns exactly one live [`Transport`] at a
//! time and consumes its ordered [`SignalStream`].
//!
//! Implementations are expected to retry ordinary disconnects internally,
//! surfacing them as `Connecting`/`Connected` signal pairs. The session
//! layer only intervenes on `Expired`, which requires a fresh dial.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use zk_protocol::{Acl, ConnState, CreateMode, SessionId, Stat, WatchedEvent, ZkError};

/// Ordered stream of raw connection-state signals for one connection.
pub type SignalStream = mpsc::UnboundedReceiver<ConnState>;

/// Change closure for [`Transport::retry_change`]: receives the current
/// node data (`None` when the node does not exist yet) and returns the
/// desired data.
pub type ChangeFn = Box<dyn FnMut(Option<&[u8]>) -> Result<Vec<u8>, ZkError> + Send>;

/// Factory for connections to the ensemble.
///
/// Called once at construction and again on every redial after session
/// expiry. Passing the previous connection's [`SessionId`] resumes the
/// logical session when the server still considers it alive.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn dial(
        &self,
        servers: &[String],
        recv_timeout: Duration,
        session_id: Option<SessionId>,
    ) -> Result<(Arc<dyn Transport>, SignalStream), ZkError>;
}

/// One established connection to the ensemble.
///
/// Data operations mirror the wire client exactly; errors come back
/// verbatim. The `_w` variants additionally register a one-shot watch and
/// return its notification channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity of the logical session this connection serves.
    fn client_id(&self) -> SessionId;

    /// Host:port of the ensemble member currently connected to.
    fn connected_server(&self) -> String;

    /// Resolved address of the current TCP connection.
    async fn current_connection(&self) -> Result<String, ZkError>;

    /// Delay between re-resolutions of the configured server list.
    fn set_servers_resolution_delay(&self, delay: Duration);

    /// Closes the connection. The signal stream surfaces a final
    /// [`ConnState::Closed`] afterwards.
    async fn close(&self) -> Result<(), ZkError>;

    async fn exists(&self, path: &str) -> Result<Option<Stat>, ZkError>;

    async fn exists_w(
        &self,
        path: &str,
    ) -> Result<(Option<Stat>, oneshot::Receiver<WatchedEvent>), ZkError>;

    async fn get(&self, path: &str) -> Result<(Vec<u8>, Stat), ZkError>;

    async fn get_w(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat, oneshot::Receiver<WatchedEvent>), ZkError>;

    async fn set(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat, ZkError>;

    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: Vec<Acl>,
    ) -> Result<String, ZkError>;

    async fn delete(&self, path: &str, version: i32) -> Result<(), ZkError>;

    async fn children(&self, path: &str) -> Result<(Vec<String>, Stat), ZkError>;

    async fn children_w(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat, oneshot::Receiver<WatchedEvent>), ZkError>;

    async fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat), ZkError>;

    async fn set_acl(&self, path: &str, acl: Vec<Acl>, version: i32) -> Result<(), ZkError>;

    /// Adds an authentication credential to this connection.
    async fn add_auth(&self, scheme: &str, auth: &[u8]) -> Result<(), ZkError>;

    /// Compare-and-swap helper: reads the node, applies `change`, and writes
    /// the result back at the read version, retrying on conflicts. Creates
    /// the node with `mode`/`acl` when it does not exist.
    async fn retry_change(
        &self,
        path: &str,
        mode: CreateMode,
        acl: Vec<Acl>,
        change: ChangeFn,
    ) -> Result<(), ZkError>;
}
