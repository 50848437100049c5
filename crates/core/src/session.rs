//! The public session handle.
//!
//! [`Session`] wraps the current transport handle behind one mutex shared
//! with the processing loop. Data operations read the handle under that
//! mutex and delegate verbatim; they never retry, translate errors, or feed
//! back into the state machine. Lifecycle conditions after construction are
//! only ever visible through the subscription channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info};
use zk_protocol::{Acl, ConnState, CreateMode, SessionId, Stat, WatchedEvent, ZkError};

use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::manager::SessionLoop;
use crate::options::SessionOptions;
use crate::subscribers::SubscriberRegistry;
use crate::transport::{ChangeFn, Connector, Transport};

/// State shared between the session handle and its processing loop.
///
/// The loop is the sole writer of `conn` and `session_id`; callers only
/// read `conn` (under this mutex) to issue data operations, so a redial's
/// handle swap can never race with an in-flight operation picking its
/// handle.
pub(crate) struct Shared {
    pub(crate) conn: Arc<dyn Transport>,
    pub(crate) session_id: SessionId,
    pub(crate) subscribers: SubscriberRegistry,
}

/// A resumable logical session against the ensemble.
///
/// Cheap to clone; all clones share the same underlying session and
/// processing loop.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Mutex<Shared>>,
}

impl Session {
    /// Establishes a fresh session. Blocks until the first connection
    /// attempt resolves; returns [`SessionError::NotConnected`] when it
    /// resolves to anything but a live connection.
    pub async fn connect(
        servers: Vec<String>,
        recv_timeout: Duration,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let options = SessionOptions::builder()
            .servers(servers)
            .recv_timeout(recv_timeout)
            .build();
        Self::with_options(options, connector).await
    }

    /// Resumes a prior logical session identified by `session_id`. Ephemeral
    /// nodes of that session survive if the server still considers it alive.
    pub async fn resume(
        servers: Vec<String>,
        recv_timeout: Duration,
        connector: Arc<dyn Connector>,
        session_id: SessionId,
    ) -> Result<Self> {
        let options = SessionOptions::builder()
            .servers(servers)
            .recv_timeout(recv_timeout)
            .session_id(session_id)
            .build();
        Self::with_options(options, connector).await
    }

    /// Establishes a session from explicit [`SessionOptions`].
    pub async fn with_options(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let SessionOptions {
            servers,
            recv_timeout,
            session_id,
        } = options;

        let (conn, mut signals) = connector
            .dial(&servers, recv_timeout, session_id)
            .await
            .map_err(|err| {
                debug!(target = "zks.session", error = %err, "initial dial failed");
                SessionError::NotConnected
            })?;

        // Consume signals until the first attempt resolves one way or the
        // other. Failure here is synchronous; the loop has not started yet.
        loop {
            match signals.recv().await {
                Some(ConnState::Connected) => break,
                Some(ConnState::Connecting) | Some(ConnState::Associating) => continue,
                Some(state) => {
                    debug!(
                        target = "zks.session",
                        signal = %state,
                        "connection attempt resolved to failure"
                    );
                    let _ = conn.close().await;
                    return Err(SessionError::NotConnected);
                }
                None => {
                    let _ = conn.close().await;
                    return Err(SessionError::NotConnected);
                }
            }
        }

        info!(
            target = "zks.session",
            server = %conn.connected_server(),
            session = %conn.client_id(),
            "session established"
        );

        let shared = Arc::new(Mutex::new(Shared {
            session_id: conn.client_id(),
            conn,
            subscribers: SubscriberRegistry::default(),
        }));

        tokio::spawn(
            SessionLoop {
                shared: Arc::clone(&shared),
                connector,
                servers,
                recv_timeout,
                signals,
            }
            .run(),
        );

        Ok(Self { shared })
    }

    /// Registers a sink for lifecycle events.
    ///
    /// Delivery order matches emission order across all sinks. Sends are
    /// blocking: a sink that stops consuming stalls the session loop, so
    /// subscribers must buffer generously or consume promptly. There is no
    /// unsubscribe; drop the receiver to stop receiving.
    pub async fn subscribe(&self, sink: mpsc::Sender<SessionEvent>) {
        self.shared.lock().await.subscribers.register(sink);
    }

    /// Identity of the current logical session, usable with
    /// [`Session::resume`] after this process dies.
    pub async fn client_id(&self) -> SessionId {
        self.conn().await.client_id()
    }

    /// Host:port of the ensemble member currently connected to.
    pub async fn current_server(&self) -> String {
        self.conn().await.connected_server()
    }

    /// Resolved address of the current TCP connection.
    pub async fn current_connection(&self) -> Result<String, ZkError> {
        self.conn().await.current_connection().await
    }

    /// Sets the delay between re-resolutions of the server list.
    pub async fn set_servers_resolution_delay(&self, delay: Duration) {
        self.conn().await.set_servers_resolution_delay(delay);
    }

    /// Closes the session. The transport surfaces a final `Closed` signal,
    /// on which the processing loop emits [`SessionEvent::Closed`] and
    /// exits.
    pub async fn close(&self) -> Result<(), ZkError> {
        self.conn().await.close().await
    }

    pub async fn exists(&self, path: &str) -> Result<Option<Stat>, ZkError> {
        self.conn().await.exists(path).await
    }

    pub async fn exists_w(
        &self,
        path: &str,
    ) -> Result<(Option<Stat>, oneshot::Receiver<WatchedEvent>), ZkError> {
        self.conn().await.exists_w(path).await
    }

    pub async fn get(&self, path: &str) -> Result<(Vec<u8>, Stat), ZkError> {
        self.conn().await.get(path).await
    }

    pub async fn get_w(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat, oneshot::Receiver<WatchedEvent>), ZkError> {
        self.conn().await.get_w(path).await
    }

    pub async fn set(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat, ZkError> {
        self.conn().await.set(path, data, version).await
    }

    pub async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: Vec<Acl>,
    ) -> Result<String, ZkError> {
        self.conn().await.create(path, data, mode, acl).await
    }

    pub async fn delete(&self, path: &str, version: i32) -> Result<(), ZkError> {
        self.conn().await.delete(path, version).await
    }

    pub async fn children(&self, path: &str) -> Result<(Vec<String>, Stat), ZkError> {
        self.conn().await.children(path).await
    }

    pub async fn children_w(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat, oneshot::Receiver<WatchedEvent>), ZkError> {
        self.conn().await.children_w(path).await
    }

    pub async fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat), ZkError> {
        self.conn().await.get_acl(path).await
    }

    pub async fn set_acl(&self, path: &str, acl: Vec<Acl>, version: i32) -> Result<(), ZkError> {
        self.conn().await.set_acl(path, acl, version).await
    }

    pub async fn add_auth(&self, scheme: &str, auth: &[u8]) -> Result<(), ZkError> {
        self.conn().await.add_auth(scheme, auth).await
    }

    /// Compare-and-swap helper; see [`Transport::retry_change`].
    pub async fn retry_change(
        &self,
        path: &str,
        mode: CreateMode,
        acl: Vec<Acl>,
        change: ChangeFn,
    ) -> Result<(), ZkError> {
        self.conn().await.retry_change(path, mode, acl, change).await
    }

    /// Current handle, read under the shared mutex so it cannot race with a
    /// redial's handle swap.
    async fn conn(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.shared.lock().await.conn)
    }
}
