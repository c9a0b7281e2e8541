use digitbot::api::{InboundMessage, OutboundRequest};
use digitbot::connection::{ConnectionManager, ConnectionSettings, ConnectionState, Listener};
use digitbot::execution::DigitStore;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Local venue: answers the bootstrap, backfill and pings; sessions numbered
/// below `dropped` hang up right after their first live tick
async fn spawn_server(dropped: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sessions = Arc::new(AtomicUsize::new(0));

    let counter = sessions.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let session = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handle_session(stream, session < dropped));
        }
    });

    (format!("ws://{}", addr), sessions)
}

async fn handle_session(stream: TcpStream, hang_up: bool) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    while let Some(Ok(frame)) = ws.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        if request.get("active_symbols").is_some() {
            let listing = json!({
                "msg_type": "active_symbols",
                "active_symbols": [
                    {"symbol": "R_100", "display_name": "Volatility 100 Index", "pip": 0.01}
                ]
            });
            let _ = ws.send(Message::Text(listing.to_string())).await;
        } else if let Some(symbol) = request.get("ticks_history").and_then(Value::as_str) {
            let history = json!({
                "msg_type": "history",
                "echo_req": {"ticks_history": symbol},
                "history": {"prices": [100.01, 100.02, 100.13]},
                "pip_size": 2
            });
            let tick = json!({
                "msg_type": "tick",
                "tick": {"symbol": symbol, "quote": 100.27, "epoch": 1},
                "pip_size": 2
            });
            let _ = ws.send(Message::Text(history.to_string())).await;
            let _ = ws.send(Message::Text(tick.to_string())).await;
            if hang_up {
                let _ = ws.close(None).await;
                return;
            }
        } else if request.get("ping").is_some() {
            let _ = ws.send(Message::Text(json!({"msg_type": "ping", "ping": "pong"}).to_string())).await;
        }
    }
}

async fn wait_for<F>(listener: &mut Listener, mut predicate: F) -> InboundMessage
where
    F: FnMut(&InboundMessage) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let message = listener.recv().await.expect("listener closed");
            if predicate(&message) {
                return message.as_ref().clone();
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

/// Everything already queued, without waiting for more
fn drain(listener: &mut Listener) -> Vec<InboundMessage> {
    let mut seen = Vec::new();
    while let Some(message) = listener.try_recv() {
        seen.push(message.as_ref().clone());
    }
    seen
}

fn create_test_settings(endpoint: String) -> ConnectionSettings {
    create_slow_retry_settings(endpoint, Duration::from_millis(50))
}

fn create_slow_retry_settings(endpoint: String, reconnect_delay: Duration) -> ConnectionSettings {
    ConnectionSettings {
        endpoint,
        reconnect_delay,
        jitter_factor: 0.0,
        connect_timeout: Duration::from_secs(2),
        ..ConnectionSettings::default()
    }
}

#[tokio::test]
async fn test_backfill_live_tick_and_reconnect() {
    let (endpoint, sessions) = spawn_server(1).await;
    let store = DigitStore::default();
    let manager = ConnectionManager::new(create_test_settings(endpoint), store.clone());
    manager.track(vec!["R_100".to_string()]);
    let mut listener = manager.subscribe();

    manager.connect().await.unwrap();
    assert!(manager.is_open());

    wait_for(&mut listener, |m| matches!(m, InboundMessage::Connected)).await;
    wait_for(&mut listener, |m| matches!(m, InboundMessage::History(_))).await;
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Tick(_))).await;
    assert_eq!(store.snapshot("R_100"), vec![1, 2, 3, 7]);

    // first session hangs up; one reconnect follows and re-subscribes
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Disconnected)).await;
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Connected)).await;
    wait_for(&mut listener, |m| matches!(m, InboundMessage::History(_))).await;
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Tick(_))).await;
    assert_eq!(store.snapshot("R_100"), vec![1, 2, 3, 7]);
    assert_eq!(sessions.load(Ordering::SeqCst), 2);

    manager.close();
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Disconnected)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(sessions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_connect_reports_error() {
    // grab a free port, then release it so nothing is listening
    let addr = {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        socket.local_addr().unwrap()
    };
    let manager = ConnectionManager::new(
        create_test_settings(format!("ws://{}", addr)),
        DigitStore::default(),
    );

    assert!(manager.connect().await.is_err());
    assert!(!manager.is_open());

    manager.close();
    assert_eq!(manager.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_manual_connect_cancels_pending_reconnect() {
    let (endpoint, sessions) = spawn_server(1).await;
    let manager = ConnectionManager::new(
        create_slow_retry_settings(endpoint, Duration::from_secs(1)),
        DigitStore::default(),
    );
    manager.track(vec!["R_100".to_string()]);
    let mut listener = manager.subscribe();

    manager.connect().await.unwrap();
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Disconnected)).await;
    assert_eq!(manager.state(), ConnectionState::Closed);

    // backoff is still sleeping; connect now instead
    manager.connect().await.unwrap();
    assert!(manager.is_open());
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Tick(_))).await;

    // the cancelled attempt would have dialled by now
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(sessions.load(Ordering::SeqCst), 2);
    assert_eq!(manager.state(), ConnectionState::Open);

    manager.close();
}

#[tokio::test]
async fn test_close_then_connect_keeps_one_session() {
    let (endpoint, sessions) = spawn_server(0).await;
    let store = DigitStore::default();
    let manager = ConnectionManager::new(create_test_settings(endpoint), store.clone());
    manager.track(vec!["R_100".to_string()]);
    let mut listener = manager.subscribe();

    manager.connect().await.unwrap();
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Tick(_))).await;

    manager.close();
    manager.connect().await.unwrap();
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Connected)).await;
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Tick(_))).await;

    // old session finishing its close must not disturb the new one
    tokio::time::sleep(Duration::from_millis(500)).await;
    let late = drain(&mut listener);
    assert!(!late.iter().any(|m| matches!(m, InboundMessage::Disconnected)), "{:?}", late);
    assert!(!late.iter().any(|m| matches!(m, InboundMessage::Connected)), "{:?}", late);
    assert_eq!(manager.state(), ConnectionState::Open);
    assert_eq!(sessions.load(Ordering::SeqCst), 2);
    assert_eq!(store.snapshot("R_100"), vec![1, 2, 3, 7]);

    manager.close();
}

#[tokio::test]
async fn test_listener_unregistering_mid_stream() {
    let (endpoint, _sessions) = spawn_server(0).await;
    let manager = ConnectionManager::new(create_test_settings(endpoint), DigitStore::default());
    manager.track(vec!["R_100".to_string()]);
    let mut leaving = manager.subscribe();
    let mut staying = manager.subscribe();

    manager.connect().await.unwrap();
    let history = wait_for(&mut leaving, |m| matches!(m, InboundMessage::History(_))).await;
    assert!(leaving.unregister());
    assert_eq!(manager.listeners().len(), 1);

    // broadcasts carry on for the remaining listener
    wait_for(&mut staying, |m| *m == history).await;
    wait_for(&mut staying, |m| matches!(m, InboundMessage::Tick(_))).await;
    assert!(manager.send(&OutboundRequest::ping()));
    wait_for(&mut staying, |m| matches!(m, InboundMessage::Pong)).await;

    let leftover = drain(&mut leaving);
    assert!(!leftover.iter().any(|m| matches!(m, InboundMessage::Pong)));
    assert!(!leaving.unregister());

    manager.close();
}

#[tokio::test]
async fn test_no_reconnect_after_manual_close() {
    let (endpoint, sessions) = spawn_server(0).await;
    let manager = ConnectionManager::new(create_test_settings(endpoint), DigitStore::default());
    manager.track(vec!["R_100".to_string()]);
    let mut listener = manager.subscribe();

    manager.connect().await.unwrap();
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Tick(_))).await;

    manager.close();
    wait_for(&mut listener, |m| matches!(m, InboundMessage::Disconnected)).await;

    // several backoff periods pass without a new dial
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(sessions.load(Ordering::SeqCst), 1);
    assert!(drain(&mut listener).is_empty());
}
