//! Fake connector and transport for exercising the session layer without a
//! real ensemble.
//!
//! [`FakeCluster`] implements [`Connector`] and hands out in-memory
//! [`FakeConn`] transports backed by a shared node tree (versions, ACLs,
//! sequential and ephemeral creates, one-shot watches). The cluster doubles
//! as the test controller: it scripts dial outcomes, injects raw
//! connection-state signals into the current stream, and records every dial
//! for inspection.
//!
//! A successful dial resolves directly to a `Connected` signal on the fresh
//! stream, the way an established connection reports itself.
//!
//! # Example
//!
//! ```ignore
//! let cluster = FakeCluster::new();
//! let session = Session::connect(servers, DEFAULT_RECV_TIMEOUT, cluster.connector()).await?;
//!
//! cluster.signal(ConnState::Expired);          // force a redial
//! cluster.fail_next_dial(ZkError::ConnectionLoss); // or make it fatal
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use zk_protocol::{
    Acl, ConnState, CreateMode, SessionId, Stat, WatchEventKind, WatchedEvent, ZkError,
};

use crate::transport::{ChangeFn, Connector, SignalStream, Transport};

/// One recorded call to [`Connector::dial`].
#[derive(Debug, Clone)]
pub struct DialRecord {
    pub servers: Vec<String>,
    pub recv_timeout: Duration,
    pub session_id: Option<SessionId>,
}

enum DialPlan {
    Fail(ZkError),
    ResolveWith(ConnState),
}

/// Scripted in-memory ensemble.
#[derive(Clone)]
pub struct FakeCluster {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    store: Arc<Store>,
    state: Mutex<ClusterState>,
}

struct ClusterState {
    next_session: i64,
    last_issued: Option<SessionId>,
    plans: VecDeque<DialPlan>,
    dials: Vec<DialRecord>,
    current: Option<Arc<FakeConn>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                store: Arc::new(Store::default()),
                state: Mutex::new(ClusterState {
                    next_session: 1,
                    last_issued: None,
                    plans: VecDeque::new(),
                    dials: Vec::new(),
                    current: None,
                }),
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// Makes the next dial fail with `err`.
    pub fn fail_next_dial(&self, err: ZkError) {
        self.inner.state.lock().plans.push_back(DialPlan::Fail(err));
    }

    /// Makes the next dial succeed but resolve its first signal to `state`
    /// instead of `Connected`.
    pub fn resolve_next_dial_with(&self, state: ConnState) {
        self.inner
            .state
            .lock()
            .plans
            .push_back(DialPlan::ResolveWith(state));
    }

    /// Injects a raw signal into the current connection's stream. Signals
    /// sent to a stream the session loop has already replaced are dropped,
    /// just as they would be with a real client.
    pub fn signal(&self, state: ConnState) {
        let current = self.inner.state.lock().current.clone();
        if let Some(conn) = current {
            let _ = conn.signal_tx.send(state);
        }
    }

    /// All dial attempts so far, including failed ones.
    pub fn dials(&self) -> Vec<DialRecord> {
        self.inner.state.lock().dials.clone()
    }

    pub fn dial_count(&self) -> usize {
        self.inner.state.lock().dials.len()
    }

    /// Polls until `count` dials have been attempted. Used by tests that
    /// must not inject signals while a redial is still swapping streams.
    pub async fn wait_for_dial_count(&self, count: usize) {
        while self.dial_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// The most recently dialed connection.
    pub fn current_conn(&self) -> Arc<FakeConn> {
        self.inner
            .state
            .lock()
            .current
            .clone()
            .expect("no connection has been dialed yet")
    }

    /// The session id handed out by the most recent successful dial.
    pub fn last_issued_session_id(&self) -> SessionId {
        self.inner
            .state
            .lock()
            .last_issued
            .clone()
            .expect("no session id issued yet")
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for FakeCluster {
    async fn dial(
        &self,
        servers: &[String],
        recv_timeout: Duration,
        session_id: Option<SessionId>,
    ) -> Result<(Arc<dyn Transport>, SignalStream), ZkError> {
        let mut state = self.inner.state.lock();
        state.dials.push(DialRecord {
            servers: servers.to_vec(),
            recv_timeout,
            session_id,
        });

        let plan = state
            .plans
            .pop_front()
            .unwrap_or(DialPlan::ResolveWith(ConnState::Connected));
        let first_signal = match plan {
            DialPlan::Fail(err) => return Err(err),
            DialPlan::ResolveWith(signal) => signal,
        };

        let issued = SessionId::new(state.next_session, b"fake-passwd".to_vec());
        state.next_session += 1;
        state.last_issued = Some(issued.clone());

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let conn = Arc::new(FakeConn {
            session_id: issued,
            server: servers.first().cloned().unwrap_or_default(),
            signal_tx,
            store: Arc::clone(&self.inner.store),
            local: Mutex::new(ConnLocal::default()),
        });
        let _ = conn.signal_tx.send(first_signal);
        state.current = Some(Arc::clone(&conn));

        Ok((conn, signal_rx))
    }
}

#[derive(Default)]
struct ConnLocal {
    closed: bool,
    close_error: Option<ZkError>,
    resolution_delay: Option<Duration>,
    auth: Vec<(String, Vec<u8>)>,
}

/// One in-memory connection handed out by [`FakeCluster`].
pub struct FakeConn {
    session_id: SessionId,
    server: String,
    signal_tx: mpsc::UnboundedSender<ConnState>,
    store: Arc<Store>,
    local: Mutex<ConnLocal>,
}

impl FakeConn {
    pub fn is_closed(&self) -> bool {
        self.local.lock().closed
    }

    /// Makes the next `close()` call fail with `err`.
    pub fn fail_close(&self, err: ZkError) {
        self.local.lock().close_error = Some(err);
    }

    pub fn servers_resolution_delay(&self) -> Option<Duration> {
        self.local.lock().resolution_delay
    }

    pub fn auth_records(&self) -> Vec<(String, Vec<u8>)> {
        self.local.lock().auth.clone()
    }
}

#[async_trait]
impl Transport for FakeConn {
    fn client_id(&self) -> SessionId {
        self.session_id.clone()
    }

    fn connected_server(&self) -> String {
        self.server.clone()
    }

    async fn current_connection(&self) -> Result<String, ZkError> {
        if self.local.lock().closed {
            return Err(ZkError::ConnectionLoss);
        }
        Ok(self.server.clone())
    }

    fn set_servers_resolution_delay(&self, delay: Duration) {
        self.local.lock().resolution_delay = Some(delay);
    }

    async fn close(&self) -> Result<(), ZkError> {
        let mut local = self.local.lock();
        if let Some(err) = local.close_error.take() {
            return Err(err);
        }
        local.closed = true;
        drop(local);
        let _ = self.signal_tx.send(ConnState::Closed);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<Option<Stat>, ZkError> {
        Ok(self.store.stat(path))
    }

    async fn exists_w(
        &self,
        path: &str,
    ) -> Result<(Option<Stat>, oneshot::Receiver<WatchedEvent>), ZkError> {
        let watch = self.store.register_watch(WatchKind::Exists, path);
        Ok((self.store.stat(path), watch))
    }

    async fn get(&self, path: &str) -> Result<(Vec<u8>, Stat), ZkError> {
        self.store.get(path)
    }

    async fn get_w(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat, oneshot::Receiver<WatchedEvent>), ZkError> {
        let (data, stat) = self.store.get(path)?;
        let watch = self.store.register_watch(WatchKind::Data, path);
        Ok((data, stat, watch))
    }

    async fn set(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat, ZkError> {
        self.store.set(path, data, version)
    }

    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: Vec<Acl>,
    ) -> Result<String, ZkError> {
        let owner = if mode.is_ephemeral() {
            self.session_id.id
        } else {
            0
        };
        self.store.create(path, data, mode, acl, owner)
    }

    async fn delete(&self, path: &str, version: i32) -> Result<(), ZkError> {
        self.store.delete(path, version)
    }

    async fn children(&self, path: &str) -> Result<(Vec<String>, Stat), ZkError> {
        self.store.children(path)
    }

    async fn children_w(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat, oneshot::Receiver<WatchedEvent>), ZkError> {
        let (children, stat) = self.store.children(path)?;
        let watch = self.store.register_watch(WatchKind::Children, path);
        Ok((children, stat, watch))
    }

    async fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat), ZkError> {
        self.store.get_acl(path)
    }

    async fn set_acl(&self, path: &str, acl: Vec<Acl>, version: i32) -> Result<(), ZkError> {
        self.store.set_acl(path, acl, version)
    }

    async fn add_auth(&self, scheme: &str, auth: &[u8]) -> Result<(), ZkError> {
        self.local
            .lock()
            .auth
            .push((scheme.to_string(), auth.to_vec()));
        Ok(())
    }

    async fn retry_change(
        &self,
        path: &str,
        mode: CreateMode,
        acl: Vec<Acl>,
        mut change: ChangeFn,
    ) -> Result<(), ZkError> {
        loop {
            match self.store.get(path) {
                Ok((data, stat)) => {
                    let next = change(Some(&data))?;
                    match self.store.set(path, next, stat.version) {
                        Ok(_) => return Ok(()),
                        Err(ZkError::BadVersion) => continue,
                        Err(err) => return Err(err),
                    }
                }
                Err(ZkError::NoNode) => {
                    let next = change(None)?;
                    let owner = if mode.is_ephemeral() {
                        self.session_id.id
                    } else {
                        0
                    };
                    match self.store.create(path, next, mode, acl.clone(), owner) {
                        Ok(_) => return Ok(()),
                        Err(ZkError::NodeExists) => continue,
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum WatchKind {
    Data,
    Exists,
    Children,
}

struct PendingWatch {
    kind: WatchKind,
    path: String,
    tx: oneshot::Sender<WatchedEvent>,
}

#[derive(Default)]
struct Node {
    data: Vec<u8>,
    acl: Vec<Acl>,
    version: i32,
    cversion: i32,
    aversion: i32,
    ephemeral_owner: i64,
}

/// Cluster-wide node tree, shared by every connection so data survives a
/// redial the way it does against a real ensemble.
#[derive(Default)]
struct Store {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    nodes: HashMap<String, Node>,
    watches: Vec<PendingWatch>,
    next_sequence: i64,
}

impl StoreInner {
    fn stat_of(&self, path: &str, node: &Node) -> Stat {
        Stat {
            version: node.version,
            cversion: node.cversion,
            aversion: node.aversion,
            ephemeral_owner: node.ephemeral_owner,
            data_length: node.data.len() as i32,
            num_children: self.child_names(path).len() as i32,
            ..Stat::default()
        }
    }

    fn child_names(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect()
    }

    fn fire(&mut self, kinds: &[WatchKind], path: &str, event: WatchedEvent) {
        let mut remaining = Vec::with_capacity(self.watches.len());
        for watch in self.watches.drain(..) {
            if watch.path == path && kinds.contains(&watch.kind) {
                let _ = watch.tx.send(event.clone());
            } else {
                remaining.push(watch);
            }
        }
        self.watches = remaining;
    }
}

fn parent_of(path: &str) -> Option<&str> {
    let idx = path.rfind('/')?;
    match idx {
        0 => Some("/"),
        _ => Some(&path[..idx]),
    }
}

impl Store {
    fn stat(&self, path: &str) -> Option<Stat> {
        let inner = self.inner.lock();
        inner.nodes.get(path).map(|node| inner.stat_of(path, node))
    }

    fn register_watch(&self, kind: WatchKind, path: &str) -> oneshot::Receiver<WatchedEvent> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().watches.push(PendingWatch {
            kind,
            path: path.to_string(),
            tx,
        });
        rx
    }

    fn get(&self, path: &str) -> Result<(Vec<u8>, Stat), ZkError> {
        let inner = self.inner.lock();
        let node = inner.nodes.get(path).ok_or(ZkError::NoNode)?;
        Ok((node.data.clone(), inner.stat_of(path, node)))
    }

    fn set(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat, ZkError> {
        let mut inner = self.inner.lock();
        let node = inner.nodes.get_mut(path).ok_or(ZkError::NoNode)?;
        if version != -1 && version != node.version {
            return Err(ZkError::BadVersion);
        }
        node.data = data;
        node.version += 1;
        let node = inner.nodes.get(path).expect("node just updated");
        let stat = inner.stat_of(path, node);
        inner.fire(
            &[WatchKind::Data, WatchKind::Exists],
            path,
            WatchedEvent::new(WatchEventKind::NodeDataChanged, path),
        );
        Ok(stat)
    }

    fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: Vec<Acl>,
        ephemeral_owner: i64,
    ) -> Result<String, ZkError> {
        let mut inner = self.inner.lock();

        let parent = parent_of(path).ok_or(ZkError::BadArguments)?;
        if parent != "/" {
            let parent_node = inner.nodes.get(parent).ok_or(ZkError::NoNode)?;
            if parent_node.ephemeral_owner != 0 {
                return Err(ZkError::NoChildrenForEphemerals);
            }
        }

        let name = if mode.is_sequential() {
            let seq = inner.next_sequence;
            inner.next_sequence += 1;
            format!("{path}{seq:010}")
        } else {
            path.to_string()
        };
        if inner.nodes.contains_key(&name) {
            return Err(ZkError::NodeExists);
        }

        inner.nodes.insert(
            name.clone(),
            Node {
                data,
                acl,
                ephemeral_owner,
                ..Node::default()
            },
        );
        if let Some(parent_node) = inner.nodes.get_mut(parent) {
            parent_node.cversion += 1;
        }

        inner.fire(
            &[WatchKind::Exists],
            &name,
            WatchedEvent::new(WatchEventKind::NodeCreated, name.as_str()),
        );
        inner.fire(
            &[WatchKind::Children],
            parent,
            WatchedEvent::new(WatchEventKind::NodeChildrenChanged, parent),
        );
        Ok(name)
    }

    fn delete(&self, path: &str, version: i32) -> Result<(), ZkError> {
        let mut inner = self.inner.lock();
        let node = inner.nodes.get(path).ok_or(ZkError::NoNode)?;
        if version != -1 && version != node.version {
            return Err(ZkError::BadVersion);
        }
        if !inner.child_names(path).is_empty() {
            return Err(ZkError::NotEmpty);
        }
        inner.nodes.remove(path);
        if let Some(parent) = parent_of(path) {
            if let Some(parent_node) = inner.nodes.get_mut(parent) {
                parent_node.cversion += 1;
            }
            inner.fire(
                &[WatchKind::Children],
                parent,
                WatchedEvent::new(WatchEventKind::NodeChildrenChanged, parent),
            );
        }
        inner.fire(
            &[WatchKind::Data, WatchKind::Exists],
            path,
            WatchedEvent::new(WatchEventKind::NodeDeleted, path),
        );
        Ok(())
    }

    fn children(&self, path: &str) -> Result<(Vec<String>, Stat), ZkError> {
        let inner = self.inner.lock();
        if path != "/" {
            let node = inner.nodes.get(path).ok_or(ZkError::NoNode)?;
            Ok((inner.child_names(path), inner.stat_of(path, node)))
        } else {
            Ok((inner.child_names(path), Stat::default()))
        }
    }

    fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat), ZkError> {
        let inner = self.inner.lock();
        let node = inner.nodes.get(path).ok_or(ZkError::NoNode)?;
        Ok((node.acl.clone(), inner.stat_of(path, node)))
    }

    fn set_acl(&self, path: &str, acl: Vec<Acl>, version: i32) -> Result<(), ZkError> {
        let mut inner = self.inner.lock();
        let node = inner.nodes.get_mut(path).ok_or(ZkError::NoNode)?;
        if version != -1 && version != node.aversion {
            return Err(ZkError::BadVersion);
        }
        node.acl = acl;
        node.aversion += 1;
        Ok(())
    }
}
