//! Connection manager tests: event ordering, idempotent start, and the
//! fixed-delay reconnect loop, against real in-process listeners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use policy_pilot_client::{
    ConnectionEvent, ConnectionManager, ConnectionState, Session, SessionPhase, RECONNECT_DELAY,
};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, format!("ws://127.0.0.1:{}", port))
}

#[tokio::test]
async fn lifecycle_events_arrive_in_occurrence_order() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        ws.send(Message::Text(r#"{"type":"start"}"#.to_string()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"end"}"#.to_string()))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
    });

    let (manager, mut events) = ConnectionManager::new(&url);
    manager.start();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within deadline")
            .expect("channel open");
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            ConnectionEvent::Connected,
            ConnectionEvent::Frame(r#"{"type":"start"}"#.to_string()),
            ConnectionEvent::Frame(r#"{"type":"end"}"#.to_string()),
            ConnectionEvent::Disconnected,
        ]
    );

    manager.stop();
    server.await.unwrap();
}

#[tokio::test]
async fn start_is_idempotent() {
    let (listener, url) = bind().await;
    let (manager, mut events) = ConnectionManager::new(&url);
    manager.start();
    manager.start();
    manager.start();

    let (tcp, _) = listener.accept().await.unwrap();
    let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Connected));

    // A second connect loop would show up as another connection attempt;
    // with a healthy channel none may arrive.
    let second = tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(second.is_err(), "no second connection expected");

    manager.stop();
}

#[tokio::test]
async fn send_while_disconnected_is_a_silent_noop() {
    let (listener, url) = bind().await;
    drop(listener);
    let (manager, _events) = ConnectionManager::new(&url);
    manager.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ne!(manager.state(), ConnectionState::Connected);
    // Must not panic or error.
    manager.send(r#"{"message":"dropped"}"#.to_string());
    manager.stop();
}

#[tokio::test]
async fn reconnects_when_server_comes_up_late() {
    // Reserve a port, then release it so the first attempts fail.
    let (listener, url) = bind().await;
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let started = Instant::now();
    let session = Session::start(&url);

    // Let at least one attempt fail before the server appears.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(session.phase(), SessionPhase::Offline);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        // Hold until the client is done.
        let _ = tokio::time::timeout(Duration::from_secs(10), ws.next()).await;
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while session.phase() != SessionPhase::Ready && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(session.phase(), SessionPhase::Ready);
    // Attempts are spaced by the fixed delay, so recovery cannot beat it.
    assert!(started.elapsed() >= RECONNECT_DELAY);

    session.stop();
    server.abort();
}

#[tokio::test]
async fn reconnects_after_an_established_connection_drops() {
    let (listener, url) = bind().await;
    let reconnected = Arc::new(AtomicBool::new(false));
    let reconnected_server = reconnected.clone();
    let server = tokio::spawn(async move {
        // First connection: accept and drop straight away.
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        drop(ws);
        // Second connection: hold open.
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        reconnected_server.store(true, Ordering::SeqCst);
        let _ = tokio::time::timeout(Duration::from_secs(10), ws.next()).await;
    });

    let session = Session::start(&url);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    // Ready while the second connection is held means we reconnected.
    while tokio::time::Instant::now() < deadline {
        if reconnected.load(Ordering::SeqCst) && session.phase() == SessionPhase::Ready {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reconnected.load(Ordering::SeqCst), "second connection never arrived");
    assert_eq!(session.phase(), SessionPhase::Ready);

    session.stop();
    server.abort();
}
