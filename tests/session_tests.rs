//! Integration tests for the session loop against a local WebSocket server

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tether::client::console::{Console, LineKind};
use tether::client::input::LineInput;
use tether::client::session::SessionMode;
use tether::client::{run_session, SessionEnd, SessionOptions, SessionSummary};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

/// Replies a test server sends for one received text frame
type Replies = fn(&str) -> Vec<String>;

/// Handle to a single-connection test server
struct TestServer {
    uri: String,
    /// Text frames the server received, in order
    received: mpsc::UnboundedReceiver<String>,
    /// Frames the server sends unprompted
    push: mpsc::UnboundedSender<String>,
    /// Ask the server to close the connection
    close: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn next_received(&mut self) -> String {
        timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("Server should receive a frame")
            .expect("Server connection ended")
    }

    async fn next_received_json(&mut self) -> Value {
        serde_json::from_str(&self.next_received().await).expect("Frame should be JSON")
    }

    fn close(&mut self) {
        if let Some(tx) = self.close.take() {
            let _ = tx.send(());
        }
    }
}

/// Start a server that optionally greets, then answers each text frame
async fn spawn_server(greeting: Option<Value>, replies: Replies) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received) = mpsc::unbounded_channel();
    let (push, mut push_rx) = mpsc::unbounded_channel::<String>();
    let (close_tx, mut close_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        if let Some(greeting) = greeting {
            ws.send(Message::Text(greeting.to_string())).await.unwrap();
        }

        loop {
            tokio::select! {
                _ = &mut close_rx => {
                    let _ = ws.close(None).await;
                    // Drain until the client acknowledges
                    while let Some(Ok(_)) = ws.next().await {}
                    break;
                }
                Some(text) = push_rx.recv() => {
                    if ws.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        for reply in replies(&text) {
                            if ws.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                        let _ = received_tx.send(text);
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    });

    TestServer {
        uri: format!("ws://{addr}"),
        received,
        push,
        close: Some(close_tx),
    }
}

/// Start a server that completes the handshake and then drops the socket
/// without a close frame
async fn spawn_dropping_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
    });
    format!("ws://{addr}")
}

/// Start a server that completes the handshake and then never reads again
async fn spawn_stalled_server() -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = release_rx.await;
        drop(ws);
    });
    (format!("ws://{addr}"), release_tx)
}

fn request_info() -> Option<Value> {
    Some(json!({"type": "request_info", "message": "Please send your username"}))
}

/// A minimal channel server
fn channel_server_replies(text: &str) -> Vec<String> {
    let msg: Value = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(_) => return vec![json!({"type": "error", "message": "Invalid JSON"}).to_string()],
    };
    let channel = msg["channel"].as_str().unwrap_or_default();
    let reply = match msg["type"].as_str() {
        Some("list_channels") => json!({
            "type": "channel_list",
            "message": "Available channels:",
            "channels": ["general", "random"],
        }),
        Some("subscribe") => json!({
            "type": "subscription_success",
            "channel": channel,
            "message": format!("Subscribed to #{channel}"),
        }),
        Some("unsubscribe") => json!({
            "type": "unsubscription_success",
            "channel": channel,
            "message": format!("Unsubscribed from #{channel}"),
        }),
        Some("message") => json!({
            "type": "channel_message",
            "channel": channel,
            "username": "ada",
            "message": msg["message"],
        }),
        _ => return Vec::new(),
    };
    vec![reply.to_string()]
}

fn heartbeat_replies(text: &str) -> Vec<String> {
    if text.contains("heartbeat") {
        vec![json!({"event": "updated", "channel": "heartbeat"}).to_string()]
    } else {
        Vec::new()
    }
}

fn no_replies(_: &str) -> Vec<String> {
    Vec::new()
}

fn options() -> SessionOptions {
    SessionOptions {
        handshake_timeout: Duration::from_millis(300),
        close_grace: Duration::from_secs(2),
        ..SessionOptions::default()
    }
}

/// Run a session in the background with scripted input
fn start_session(
    uri: &str,
    options: SessionOptions,
    console: &Console,
) -> (mpsc::Sender<String>, JoinHandle<anyhow::Result<SessionSummary>>) {
    start_session_with_interrupt(uri, options, console, std::future::pending())
}

fn start_session_with_interrupt<F>(
    uri: &str,
    options: SessionOptions,
    console: &Console,
    interrupt: F,
) -> (mpsc::Sender<String>, JoinHandle<anyhow::Result<SessionSummary>>)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, input) = LineInput::channel(16);
    let uri = uri.to_string();
    let console = console.clone();
    let handle =
        tokio::spawn(async move { run_session(&uri, &options, input, &console, interrupt).await });
    (tx, handle)
}

async fn finish(handle: JoinHandle<anyhow::Result<SessionSummary>>) -> SessionSummary {
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("Session should finish")
        .expect("Session task panicked")
        .expect("Session should succeed")
}

/// Wait until the console shows a line containing `needle`
async fn wait_for_line(console: &Console, needle: &str) {
    let found = timeout(Duration::from_secs(5), async {
        loop {
            if console.captured_text().iter().any(|l| l.contains(needle)) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        found.is_ok(),
        "Timed out waiting for {:?}; console: {:#?}",
        needle,
        console.captured_text()
    );
}

#[tokio::test]
async fn test_channel_server_session() {
    let mut server = spawn_server(request_info(), channel_server_replies).await;
    let console = Console::capture();
    let (tx, handle) = start_session(&server.uri, options(), &console);

    tx.send("ada".to_string()).await.unwrap();
    assert_eq!(
        server.next_received_json().await,
        json!({"type": "user_info", "username": "ada"})
    );
    wait_for_line(&console, "Connected to custom server!").await;

    tx.send("/channels".to_string()).await.unwrap();
    assert_eq!(
        server.next_received_json().await,
        json!({"type": "list_channels"})
    );
    wait_for_line(&console, "2. #random").await;

    tx.send("/subscribe general".to_string()).await.unwrap();
    assert_eq!(
        server.next_received_json().await,
        json!({"type": "subscribe", "action": "subscribe", "channel": "general"})
    );
    wait_for_line(&console, "✓ Subscribed to #general").await;

    tx.send("#general Hello everyone!".to_string()).await.unwrap();
    assert_eq!(
        server.next_received_json().await,
        json!({"type": "message", "channel": "general", "message": "Hello everyone!"})
    );
    wait_for_line(&console, "#general <ada> Hello everyone!").await;

    tx.send("/quit".to_string()).await.unwrap();
    let summary = finish(handle).await;

    assert_eq!(summary.mode, SessionMode::ChannelServer);
    assert_eq!(summary.end, SessionEnd::OperatorQuit);
    assert_eq!(summary.subscribed, BTreeSet::from(["general".to_string()]));

    let text = console.captured_text();
    assert!(text.iter().any(|l| l == "Detected custom channel server"));
    assert!(text.iter().any(|l| l == "  1. #general"));
    assert!(text.iter().any(|l| l == "  2. #random"));
}

#[tokio::test]
async fn test_identity_is_queued_exactly_once() {
    let mut server = spawn_server(request_info(), no_replies).await;
    let console = Console::capture();
    let mut options = options();
    options.username = Some("bot".to_string());
    let (tx, handle) = start_session(&server.uri, options, &console);

    assert_eq!(
        server.next_received_json().await,
        json!({"type": "user_info", "username": "bot"})
    );

    tx.send("/channels".to_string()).await.unwrap();
    assert_eq!(server.next_received_json().await["type"], "list_channels");

    drop(tx);
    let summary = finish(handle).await;
    assert_eq!(summary.end, SessionEnd::OperatorQuit);
    assert!(!console.captured_text().iter().any(|l| l.contains("Enter your username")));
}

#[tokio::test]
async fn test_empty_username_defaults_to_anonymous() {
    let mut server = spawn_server(request_info(), no_replies).await;
    let console = Console::capture();
    let (tx, handle) = start_session(&server.uri, options(), &console);

    tx.send(String::new()).await.unwrap();
    assert_eq!(
        server.next_received_json().await,
        json!({"type": "user_info", "username": "Anonymous"})
    );

    tx.send("/quit".to_string()).await.unwrap();
    finish(handle).await;
}

#[tokio::test]
async fn test_unsubscribe_removes_channel() {
    let mut server = spawn_server(request_info(), channel_server_replies).await;
    let console = Console::capture();
    let mut options = options();
    options.username = Some("ada".to_string());
    let (tx, handle) = start_session(&server.uri, options, &console);
    server.next_received().await;

    tx.send("/subscribe general".to_string()).await.unwrap();
    tx.send("/subscribe random".to_string()).await.unwrap();
    wait_for_line(&console, "Subscribed to #random").await;

    tx.send("/subscriptions".to_string()).await.unwrap();
    wait_for_line(&console, "Current subscriptions: #general, #random").await;

    tx.send("/unsubscribe general".to_string()).await.unwrap();
    wait_for_line(&console, "Unsubscribed from #general").await;

    tx.send("/quit".to_string()).await.unwrap();
    let summary = finish(handle).await;
    assert_eq!(summary.subscribed, BTreeSet::from(["random".to_string()]));
}

#[tokio::test]
async fn test_generic_endpoint_after_silence() {
    let mut server = spawn_server(None, heartbeat_replies).await;
    let console = Console::capture();
    let (tx, handle) = start_session(&server.uri, options(), &console);

    wait_for_line(&console, "No initial message received").await;

    let payload = r#"{"channel":"heartbeat","event":"subscribe"}"#;
    tx.send(payload.to_string()).await.unwrap();
    assert_eq!(server.next_received().await, payload);

    wait_for_line(&console, "💓 Heartbeat").await;
    let structured = console
        .captured()
        .into_iter()
        .find(|l| l.kind == LineKind::Structured)
        .expect("Heartbeat should be pretty-printed");
    assert!(structured.text.contains("\"event\": \"updated\""));

    server.close();
    let summary = finish(handle).await;
    assert_eq!(summary.mode, SessionMode::GenericEndpoint);
    assert_eq!(summary.end, SessionEnd::ServerClosed);
    assert!(summary.subscribed.is_empty());
    drop(tx);
}

#[tokio::test]
async fn test_first_message_is_shown_but_not_dispatched() {
    let greeting = json!({"event": "info", "version": 2});
    let mut server = spawn_server(Some(greeting), no_replies).await;
    let console = Console::capture();
    let (_tx, handle) = start_session(&server.uri, options(), &console);

    wait_for_line(&console, "Detected external WebSocket API").await;
    wait_for_line(&console, "Connected to external API!").await;
    server.close();
    let summary = finish(handle).await;

    assert_eq!(summary.mode, SessionMode::GenericEndpoint);
    let lines = console.captured();
    assert!(lines
        .iter()
        .any(|l| l.text.starts_with("Received: ") && l.text.contains("\"version\":2")));
    assert!(!lines.iter().any(|l| l.kind == LineKind::Structured));
}

#[tokio::test]
async fn test_invalid_payload_is_not_sent() {
    let mut server = spawn_server(None, no_replies).await;
    let console = Console::capture();
    let (tx, handle) = start_session(&server.uri, options(), &console);

    tx.send("not json".to_string()).await.unwrap();
    tx.send("#general hi".to_string()).await.unwrap();
    tx.send(r#"{"op":"ping"}"#.to_string()).await.unwrap();

    assert_eq!(server.next_received().await, r#"{"op":"ping"}"#);
    let rejections = console
        .captured_text()
        .iter()
        .filter(|l| l.starts_with("Invalid JSON"))
        .count();
    assert_eq!(rejections, 2);

    tx.send("/quit".to_string()).await.unwrap();
    finish(handle).await;
}

#[tokio::test]
async fn test_actions_sent_in_operator_order() {
    let mut server = spawn_server(None, no_replies).await;
    let console = Console::capture();
    let (tx, handle) = start_session(&server.uri, options(), &console);

    for i in 0..5 {
        tx.send(format!(r#"{{"n":{i}}}"#)).await.unwrap();
    }
    for i in 0..5 {
        assert_eq!(server.next_received().await, format!(r#"{{"n":{i}}}"#));
    }

    drop(tx);
    finish(handle).await;
}

#[tokio::test]
async fn test_input_stays_responsive_while_server_is_idle() {
    let mut server = spawn_server(None, no_replies).await;
    let console = Console::capture();
    let (tx, handle) = start_session(&server.uri, options(), &console);
    wait_for_line(&console, "Connected to external API!").await;

    // The inbound drain is parked on a silent connection
    tx.send(r#"{"ping":1}"#.to_string()).await.unwrap();
    let received = timeout(Duration::from_millis(500), server.received.recv()).await;
    assert_eq!(received.ok().flatten().as_deref(), Some(r#"{"ping":1}"#));

    tx.send("/quit".to_string()).await.unwrap();
    finish(handle).await;
}

#[tokio::test]
async fn test_inbound_events_render_while_operator_is_idle() {
    let mut server = spawn_server(None, no_replies).await;
    let console = Console::capture();
    // Input is never written to; the operator is idle
    let (_tx, handle) = start_session(&server.uri, options(), &console);
    wait_for_line(&console, "Connected to external API!").await;

    server
        .push
        .send(json!({"seqnum": 7, "op": "trade"}).to_string())
        .unwrap();
    wait_for_line(&console, "📦 Message #7").await;
    server.push.send("plain text".to_string()).unwrap();
    wait_for_line(&console, "plain text").await;

    server.close();
    let summary = finish(handle).await;
    assert_eq!(summary.end, SessionEnd::ServerClosed);
    assert!(console
        .captured_text()
        .iter()
        .any(|l| l == "Connection closed by server"));
}

#[tokio::test]
async fn test_interrupt_closes_session() {
    let mut server = spawn_server(request_info(), no_replies).await;
    let console = Console::capture();
    let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();
    let mut options = options();
    options.username = Some("ada".to_string());
    let (_tx, handle) = start_session_with_interrupt(&server.uri, options, &console, async move {
        let _ = interrupt_rx.await;
    });

    server.next_received().await;
    wait_for_line(&console, "Connected to custom server!").await;
    interrupt_tx.send(()).unwrap();

    let summary = finish(handle).await;
    assert_eq!(summary.end, SessionEnd::Interrupted);
    assert_eq!(summary.mode, SessionMode::ChannelServer);
    assert!(console.captured_text().iter().any(|l| l.contains("Disconnecting...")));
}

#[tokio::test]
async fn test_close_during_handshake_fails_open() {
    let mut server = spawn_server(None, no_replies).await;
    server.close();
    let console = Console::capture();
    let (_tx, handle) = start_session(&server.uri, options(), &console);

    let summary = finish(handle).await;
    assert_eq!(summary.mode, SessionMode::GenericEndpoint);
    assert_eq!(summary.end, SessionEnd::ServerClosed);
    assert!(console
        .captured_text()
        .iter()
        .any(|l| l.starts_with("Error detecting server type")));
    assert!(console
        .captured_text()
        .iter()
        .any(|l| l.contains("Connected to external API!")));
}

#[tokio::test]
async fn test_dropped_socket_during_handshake_fails_open() {
    let uri = spawn_dropping_server().await;
    let console = Console::capture();
    let (_tx, handle) = start_session(&uri, options(), &console);

    let summary = finish(handle).await;
    assert_eq!(summary.mode, SessionMode::GenericEndpoint);
    assert_eq!(summary.end, SessionEnd::ServerClosed);
    assert!(console
        .captured_text()
        .iter()
        .any(|l| l.starts_with("Error detecting server type")));
}

#[tokio::test]
async fn test_interrupt_at_username_prompt_sends_nothing() {
    let mut server = spawn_server(request_info(), no_replies).await;
    let console = Console::capture();
    let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();
    let (_tx, handle) = start_session_with_interrupt(&server.uri, options(), &console, async move {
        let _ = interrupt_rx.await;
    });

    wait_for_line(&console, "Enter your username: ").await;
    interrupt_tx.send(()).unwrap();

    let summary = finish(handle).await;
    assert_eq!(summary.end, SessionEnd::Interrupted);
    assert_eq!(summary.mode, SessionMode::ChannelServer);
    assert!(summary.subscribed.is_empty());

    // The connection ends without the server ever seeing a text frame
    let received = timeout(Duration::from_secs(5), server.received.recv())
        .await
        .expect("Server connection should end");
    assert_eq!(received, None);
}

#[tokio::test]
async fn test_interrupt_while_closing_against_stalled_peer() {
    let (uri, _release) = spawn_stalled_server().await;
    let console = Console::capture();
    let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();
    let options = SessionOptions {
        close_grace: Duration::from_secs(60),
        ..options()
    };
    let (tx, handle) = start_session_with_interrupt(&uri, options, &console, async move {
        let _ = interrupt_rx.await;
    });
    wait_for_line(&console, "Connected to external API!").await;

    // Enough data to fill the socket buffers of a peer that never reads
    let blob = format!(r#"{{"blob":"{}"}}"#, "x".repeat(1 << 20));
    for _ in 0..32 {
        tx.send(blob.clone()).await.unwrap();
    }
    tx.send("/quit".to_string()).await.unwrap();
    sleep(Duration::from_millis(300)).await;
    interrupt_tx.send(()).unwrap();

    let summary = finish(handle).await;
    assert_eq!(summary.end, SessionEnd::Interrupted);
    assert!(console.captured_text().iter().any(|l| l.contains("Disconnecting...")));
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let console = Console::capture();
    let (tx, input) = LineInput::channel(1);
    let result = run_session(
        &format!("ws://{addr}"),
        &options(),
        input,
        &console,
        std::future::pending(),
    )
    .await;
    drop(tx);

    assert!(result.is_err());
    assert!(console
        .captured_text()
        .iter()
        .any(|l| l.starts_with("Connection failed")));
    assert!(!console
        .captured_text()
        .iter()
        .any(|l| l.contains("Detecting server type")));
}
