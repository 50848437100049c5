//! The session lifecycle state machine.
//!
//! One task per session consumes the transport's ordered signal stream and
//! applies a fixed transition table:
//!
//! | signal       | action                                   | event emitted        |
//! |--------------|------------------------------------------|----------------------|
//! | `Connecting` | none                                     | `Disconnected`       |
//! | `Associating`| none                                     | —                    |
//! | `Connected`  | clear `expired` if set                   | `Reconnected`, or `ExpiredReconnected` when `expired` was set |
//! | `Expired`    | redial with the last known session id    | — (the new stream's `Connected` emits `ExpiredReconnected`) |
//! | `Expired`, redial fails | exit                          | `Failed` (terminal)  |
//! | `AuthFailed` | exit                                     | `Failed` (terminal)  |
//! | `Closed`     | exit                                     | `Closed` (terminal)  |
//!
//! Redial happens only on expiry: ordinary disconnects are retried inside
//! the wire client, which keeps delivering `Connecting`/`Connected` pairs.
//! On a successful redial the new handle and signal stream replace the old
//! ones under the session mutex, the stale handle is closed (its close
//! error is logged and swallowed), and the resumption token is refreshed
//! from the new handle before the mutex is released.
//!
//! No state transition ever happens off this task; parallel consumption of
//! the signal stream is never valid because transition ordering must be
//! preserved.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use zk_protocol::ConnState;

use crate::event::SessionEvent;
use crate::session::Shared;
use crate::transport::{Connector, SignalStream};

/// The per-session processing loop. Owns the signal stream and the
/// `expired` flag; shares the handle, token, and subscriber list with the
/// [`Session`](crate::Session) through `shared`.
pub(crate) struct SessionLoop {
    pub(crate) shared: Arc<Mutex<Shared>>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) servers: Vec<String>,
    pub(crate) recv_timeout: Duration,
    pub(crate) signals: SignalStream,
}

impl SessionLoop {
    /// Runs until a terminal event. Spawned once per session, right after
    /// construction resolved the first signal.
    pub(crate) async fn run(mut self) {
        let mut expired = false;
        while let Some(signal) = self.signals.recv().await {
            match signal {
                ConnState::Expired => {
                    info!(target = "zks.session", "session expired; redialing");
                    expired = true;
                    let session_id = self.shared.lock().await.session_id.clone();
                    match self
                        .connector
                        .dial(&self.servers, self.recv_timeout, Some(session_id))
                        .await
                    {
                        Ok((conn, signals)) => {
                            let mut shared = self.shared.lock().await;
                            let stale = std::mem::replace(&mut shared.conn, conn);
                            if let Err(err) = stale.close().await {
                                warn!(
                                    target = "zks.session",
                                    error = %err,
                                    "error closing stale connection"
                                );
                            }
                            shared.session_id = shared.conn.client_id();
                            self.signals = signals;
                            info!(
                                target = "zks.session",
                                server = %shared.conn.connected_server(),
                                "session re-established"
                            );
                        }
                        Err(err) => {
                            self.broadcast(SessionEvent::Failed).await;
                            error!(
                                target = "zks.session",
                                error = %err,
                                "redial after expiry failed; session terminated"
                            );
                            return;
                        }
                    }
                }
                ConnState::AuthFailed => {
                    self.broadcast(SessionEvent::Failed).await;
                    error!(
                        target = "zks.session",
                        "authentication failed; session terminated"
                    );
                    return;
                }
                ConnState::Connecting => {
                    self.broadcast(SessionEvent::Disconnected).await;
                    info!(target = "zks.session", "disconnected; client reconnecting");
                }
                ConnState::Associating => {
                    // Intermediate protocol phase, nothing to do.
                }
                ConnState::Connected => {
                    if expired {
                        self.broadcast(SessionEvent::ExpiredReconnected).await;
                        info!(
                            target = "zks.session",
                            "reconnected after expiry; all ephemeral nodes purged"
                        );
                        expired = false;
                    } else {
                        self.broadcast(SessionEvent::Reconnected).await;
                        info!(
                            target = "zks.session",
                            "reconnected before the session timed out"
                        );
                    }
                }
                ConnState::Closed => {
                    self.broadcast(SessionEvent::Closed).await;
                    info!(target = "zks.session", "session closed");
                    return;
                }
            }
        }

        // The transport dropped its signal sender without a final Closed.
        // Contract violation on its part; nothing sensible to emit.
        warn!(
            target = "zks.session",
            "signal stream ended without a closed signal"
        );
    }

    async fn broadcast(&self, event: SessionEvent) {
        self.shared.lock().await.subscribers.broadcast(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_transport::FakeCluster;
    use crate::session::Session;
    use crate::options::DEFAULT_RECV_TIMEOUT;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tokio::sync::mpsc;
    use zk_protocol::{Acl, CreateMode, PERM_ALL, ZkError};

    async fn connected_session() -> (Session, FakeCluster, mpsc::Receiver<SessionEvent>) {
        let cluster = FakeCluster::new();
        let session = Session::connect(
            vec!["zk1:2181".to_string(), "zk2:2181".to_string()],
            DEFAULT_RECV_TIMEOUT,
            cluster.connector(),
        )
        .await
        .expect("initial connect");
        let (tx, rx) = mpsc::channel(64);
        session.subscribe(tx).await;
        (session, cluster, rx)
    }

    async fn assert_silent(rx: &mut mpsc::Receiver<SessionEvent>) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "expected no further events");
    }

    #[tokio::test]
    async fn connecting_then_connected_reports_disconnect_and_reconnect() {
        let (_session, cluster, mut rx) = connected_session().await;

        cluster.signal(ConnState::Connecting);
        cluster.signal(ConnState::Connected);

        assert_eq!(rx.recv().await, Some(SessionEvent::Disconnected));
        assert_eq!(rx.recv().await, Some(SessionEvent::Reconnected));
    }

    #[tokio::test]
    async fn expiry_with_successful_redial_reports_expired_reconnected() {
        let (session, cluster, mut rx) = connected_session().await;
        let first_id = session.client_id().await;

        cluster.signal(ConnState::Expired);

        assert_eq!(rx.recv().await, Some(SessionEvent::ExpiredReconnected));
        // The expired flag is cleared: a later Connected is a plain
        // reconnect again.
        cluster.signal(ConnState::Connected);
        assert_eq!(rx.recv().await, Some(SessionEvent::Reconnected));

        let second_id = session.client_id().await;
        assert_ne!(first_id, second_id, "token must be refreshed by the redial");
    }

    #[tokio::test]
    async fn redial_resumes_with_the_last_known_token() {
        let (_session, cluster, mut rx) = connected_session().await;
        let first_id = cluster.last_issued_session_id();

        cluster.signal(ConnState::Expired);
        assert_eq!(rx.recv().await, Some(SessionEvent::ExpiredReconnected));

        let dials = cluster.dials();
        assert_eq!(dials.len(), 2);
        assert_eq!(dials[1].session_id.as_ref(), Some(&first_id));
        assert_eq!(
            dials[1].servers,
            ["zk1:2181", "zk2:2181"].map(String::from)
        );
        assert_eq!(dials[1].recv_timeout, DEFAULT_RECV_TIMEOUT);
    }

    #[tokio::test]
    async fn stale_handle_is_closed_after_redial() {
        let (_session, cluster, mut rx) = connected_session().await;
        let stale = cluster.current_conn();

        cluster.signal(ConnState::Expired);
        assert_eq!(rx.recv().await, Some(SessionEvent::ExpiredReconnected));

        assert!(stale.is_closed());
        assert!(!cluster.current_conn().is_closed());
    }

    #[tokio::test]
    async fn stale_handle_close_error_is_swallowed() {
        let (session, cluster, mut rx) = connected_session().await;
        cluster.current_conn().fail_close(ZkError::ConnectionLoss);

        cluster.signal(ConnState::Expired);
        assert_eq!(rx.recv().await, Some(SessionEvent::ExpiredReconnected));

        // Session keeps working on the fresh handle.
        session
            .create(
                "/after",
                b"ok".to_vec(),
                CreateMode::Persistent,
                Acl::world(PERM_ALL),
            )
            .await
            .expect("session usable after swallowed close error");
    }

    #[tokio::test]
    async fn failed_redial_is_terminal() {
        let (_session, cluster, mut rx) = connected_session().await;

        cluster.fail_next_dial(ZkError::ConnectionLoss);
        cluster.signal(ConnState::Expired);

        assert_eq!(rx.recv().await, Some(SessionEvent::Failed));
        cluster.signal(ConnState::Connected);
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn auth_failure_is_terminal() {
        let (_session, cluster, mut rx) = connected_session().await;

        cluster.signal(ConnState::AuthFailed);

        assert_eq!(rx.recv().await, Some(SessionEvent::Failed));
        cluster.signal(ConnState::Connecting);
        cluster.signal(ConnState::Connected);
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn closed_signal_is_terminal() {
        let (_session, cluster, mut rx) = connected_session().await;

        cluster.signal(ConnState::Closed);

        assert_eq!(rx.recv().await, Some(SessionEvent::Closed));
        cluster.signal(ConnState::Connected);
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn associating_is_a_no_op() {
        let (_session, cluster, mut rx) = connected_session().await;

        cluster.signal(ConnState::Associating);
        cluster.signal(ConnState::Associating);
        cluster.signal(ConnState::Connecting);

        // Nothing before the Disconnected from Connecting.
        assert_eq!(rx.recv().await, Some(SessionEvent::Disconnected));
        cluster.signal(ConnState::Connected);
        // Still a plain reconnect: Associating did not disturb `expired`.
        assert_eq!(rx.recv().await, Some(SessionEvent::Reconnected));
    }

    #[tokio::test]
    async fn subscriber_registered_after_terminal_event_receives_nothing() {
        let (session, cluster, mut rx) = connected_session().await;

        cluster.signal(ConnState::Closed);
        assert_eq!(rx.recv().await, Some(SessionEvent::Closed));

        let (late_tx, mut late_rx) = mpsc::channel(4);
        session.subscribe(late_tx).await;
        cluster.signal(ConnState::Connecting);
        assert_silent(&mut late_rx).await;
    }

    /// Scripted step for the randomized table-conformance test.
    #[derive(Debug, Clone, Copy)]
    enum Step {
        Connecting,
        Associating,
        Connected,
        ExpiredRedialOk,
        ExpiredRedialFails,
        AuthFailed,
        Closed,
    }

    impl Step {
        fn random(rng: &mut StdRng) -> Self {
            match rng.gen_range(0..10) {
                0..=2 => Step::Connecting,
                3 => Step::Associating,
                4..=6 => Step::Connected,
                7 => Step::ExpiredRedialOk,
                8 => Step::ExpiredRedialFails,
                9 => {
                    if rng.gen_bool(0.5) {
                        Step::AuthFailed
                    } else {
                        Step::Closed
                    }
                }
                _ => unreachable!(),
            }
        }

        fn is_terminal(self) -> bool {
            matches!(
                self,
                Step::ExpiredRedialFails | Step::AuthFailed | Step::Closed
            )
        }
    }

    /// Model oracle for the transition table. The fake transport resolves a
    /// successful redial directly to a `Connected` signal on the fresh
    /// stream, so an `ExpiredRedialOk` step yields `ExpiredReconnected` and
    /// leaves the flag cleared.
    fn expected_events(steps: &[Step]) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for step in steps {
            match step {
                Step::Connecting => events.push(SessionEvent::Disconnected),
                Step::Associating => {}
                Step::Connected => events.push(SessionEvent::Reconnected),
                Step::ExpiredRedialOk => events.push(SessionEvent::ExpiredReconnected),
                Step::ExpiredRedialFails | Step::AuthFailed => {
                    events.push(SessionEvent::Failed);
                    break;
                }
                Step::Closed => {
                    events.push(SessionEvent::Closed);
                    break;
                }
            }
        }
        events
    }

    #[tokio::test]
    async fn random_signal_sequences_match_the_transition_table() {
        let mut rng = StdRng::seed_from_u64(0x5e55_1045);

        for _ in 0..50 {
            let mut steps = Vec::new();
            for _ in 0..12 {
                let step = Step::random(&mut rng);
                steps.push(step);
                if step.is_terminal() {
                    break;
                }
            }

            let (_session, cluster, mut rx) = connected_session().await;
            let mut expected_dials = 1;
            for step in &steps {
                match step {
                    Step::Connecting => cluster.signal(ConnState::Connecting),
                    Step::Associating => cluster.signal(ConnState::Associating),
                    Step::Connected => cluster.signal(ConnState::Connected),
                    Step::ExpiredRedialOk => {
                        cluster.signal(ConnState::Expired);
                        expected_dials += 1;
                        // The loop swaps streams on redial; wait for the
                        // swap so the next signal lands on the live stream.
                        cluster.wait_for_dial_count(expected_dials).await;
                    }
                    Step::ExpiredRedialFails => {
                        cluster.fail_next_dial(ZkError::ConnectionLoss);
                        cluster.signal(ConnState::Expired);
                    }
                    Step::AuthFailed => cluster.signal(ConnState::AuthFailed),
                    Step::Closed => cluster.signal(ConnState::Closed),
                }
            }

            let expected = expected_events(&steps);
            let mut observed = Vec::new();
            for _ in 0..expected.len() {
                match rx.recv().await {
                    Some(event) => observed.push(event),
                    None => break,
                }
            }
            assert_eq!(observed, expected, "steps: {steps:?}");
            assert_silent(&mut rx).await;
        }
    }
}
