//! End-to-end lifecycle scenarios against the fake transport.

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use zks::fake_transport::FakeCluster;
use zks::protocol::{Acl, ConnState, CreateMode, PERM_ALL, ZkError};
use zks::{DEFAULT_RECV_TIMEOUT, Session, SessionEvent, SessionOptions};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn drain(rx: &mut mpsc::Receiver<SessionEvent>, count: usize) -> Vec<SessionEvent> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        match rx.recv().await {
            Some(event) => events.push(event),
            None => break,
        }
    }
    events
}

#[tokio::test]
async fn full_session_life_is_observed_identically_by_all_subscribers() -> Result<()> {
    init_tracing();
    let cluster = FakeCluster::new();
    let session = Session::connect(
        vec!["zk1:2181".to_string(), "zk2:2181".to_string()],
        DEFAULT_RECV_TIMEOUT,
        cluster.connector(),
    )
    .await?;

    let (tx_a, mut rx_a) = mpsc::channel(32);
    let (tx_b, mut rx_b) = mpsc::channel(32);
    session.subscribe(tx_a).await;
    session.subscribe(tx_b).await;

    // A transient outage the wire client recovers from on its own.
    cluster.signal(ConnState::Connecting);
    cluster.signal(ConnState::Connected);

    // A server-side expiry that forces a redial with the stored token.
    cluster.signal(ConnState::Expired);

    // Pace on the first subscriber: once it has seen the reconnect-after-
    // expiry the loop is done swapping handles and close() hits the fresh
    // one.
    assert_eq!(
        drain(&mut rx_a, 3).await,
        vec![
            SessionEvent::Disconnected,
            SessionEvent::Reconnected,
            SessionEvent::ExpiredReconnected,
        ]
    );

    session.close().await?;
    assert_eq!(rx_a.recv().await, Some(SessionEvent::Closed));

    // The second subscriber saw the exact same trace in the same order.
    assert_eq!(
        drain(&mut rx_b, 4).await,
        vec![
            SessionEvent::Disconnected,
            SessionEvent::Reconnected,
            SessionEvent::ExpiredReconnected,
            SessionEvent::Closed,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn session_stays_usable_across_an_expiry_redial() -> Result<()> {
    init_tracing();
    let cluster = FakeCluster::new();
    let session = Session::connect(
        vec!["zk1:2181".to_string()],
        DEFAULT_RECV_TIMEOUT,
        cluster.connector(),
    )
    .await?;
    let (tx, mut rx) = mpsc::channel(32);
    session.subscribe(tx).await;

    session
        .create(
            "/state",
            b"before".to_vec(),
            CreateMode::Persistent,
            Acl::world(PERM_ALL),
        )
        .await?;
    let token_before = session.client_id().await;

    cluster.signal(ConnState::Expired);
    assert_eq!(rx.recv().await, Some(SessionEvent::ExpiredReconnected));

    // Data operations keep flowing through the fresh handle without the
    // caller doing anything.
    let (data, _stat) = session.get("/state").await?;
    assert_eq!(data, b"before");
    assert_ne!(session.client_id().await, token_before);
    Ok(())
}

#[tokio::test]
async fn failed_session_emits_failed_once_and_nothing_more() -> Result<()> {
    init_tracing();
    let cluster = FakeCluster::new();
    let session = Session::connect(
        vec!["zk1:2181".to_string()],
        DEFAULT_RECV_TIMEOUT,
        cluster.connector(),
    )
    .await?;
    let (tx, mut rx) = mpsc::channel(32);
    session.subscribe(tx).await;

    cluster.fail_next_dial(ZkError::ConnectionLoss);
    cluster.signal(ConnState::Expired);
    assert_eq!(rx.recv().await, Some(SessionEvent::Failed));

    // The loop is gone; nothing else ever arrives, even after more signals.
    cluster.signal(ConnState::Connected);
    cluster.signal(ConnState::Closed);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn resumed_session_presents_the_prior_identity_to_the_ensemble() -> Result<()> {
    init_tracing();
    let cluster = FakeCluster::new();
    let first = Session::connect(
        vec!["zk1:2181".to_string()],
        DEFAULT_RECV_TIMEOUT,
        cluster.connector(),
    )
    .await?;
    let token = first.client_id().await;
    first.close().await?;

    let options = SessionOptions::builder()
        .servers_csv("zk1:2181,zk2:2181")
        .recv_timeout(Duration::from_secs(10))
        .session_id(token.clone())
        .build();
    let _resumed = Session::with_options(options, cluster.connector()).await?;

    let dials = cluster.dials();
    assert_eq!(dials.len(), 2);
    assert_eq!(dials[1].session_id, Some(token));
    assert_eq!(dials[1].recv_timeout, Duration::from_secs(10));
    assert_eq!(
        dials[1].servers,
        ["zk1:2181", "zk2:2181"].map(String::from)
    );
    Ok(())
}
