//! End-to-end tests of the notification channel against a local server.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use common::{TestServer, eventually, init_tracing, unused_port, within};
use fz_notifications::channel::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use fz_notifications::{
    Backoff, ChannelState, CloseEvent, Error, NotificationChannel, Reconnector, Value,
};

/// Forwards every value a handler receives into a test-side queue.
fn forward(channel: &NotificationChannel, action: &str) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    channel.subscribe(action, move |data| {
        let _ = tx.send(data);
    });
    rx
}

fn count_opens(channel: &NotificationChannel) -> Arc<AtomicUsize> {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    channel.on_open(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    opens
}

fn collect_closes(channel: &NotificationChannel) -> mpsc::UnboundedReceiver<CloseEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    channel.on_close(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_frame_delivered_to_matching_handler_only() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();

    let mut progressed = forward(&channel, "job_progressed");
    let mut other = forward(&channel, "new_issue");

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client
        .send_text(
            r#"{"action":"job_progressed","data":{"job_id":"abc","progress":{"$numberDouble":"42.5"}}}"#,
        )
        .await;

    let data = within(progressed.recv()).await.unwrap();
    assert_eq!(data["job_id"].as_str(), Some("abc"));
    assert_eq!(data["progress"], Value::Double(42.5));

    // Frames are dispatched in order, so a marker proves nothing else arrived.
    client
        .send_text(r#"{"action":"job_progressed","data":"marker"}"#)
        .await;
    assert_eq!(
        within(progressed.recv()).await.unwrap().as_str(),
        Some("marker")
    );
    assert!(other.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_action_and_bad_frames_are_dropped() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    let mut jobs = forward(&channel, "new_job");
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closes);
    channel.on_close(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client
        .send_text(r#"{"action":"unrecognized_action","data":{"x":1}}"#)
        .await;
    client.send_text("{not json").await;
    client.send_text(r#"{"data":"no action"}"#).await;
    client.send_binary(b"\x00\x01").await;
    client
        .send_text(r#"{"action":"new_job","data":{"ident":7}}"#)
        .await;

    let data = within(jobs.recv()).await.unwrap();
    assert_eq!(data["ident"].as_u64(), Some(7));
    assert_eq!(channel.state(), ChannelState::Open);
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_subscription_replaces_first() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();

    let first_hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&first_hits);
    channel.subscribe("remove_job", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut second = forward(&channel, "remove_job");

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client
        .send_text(r#"{"action":"remove_job","data":{"ident":1}}"#)
        .await;
    within(second.recv()).await.unwrap();
    assert_eq!(first_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_delivery() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    channel.subscribe("activate_job", |_| {
        panic!("handler bug");
    });
    let mut stats = forward(&channel, "refresh_stats");

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client
        .send_text(r#"{"action":"activate_job","data":null}"#)
        .await;
    client
        .send_text(r#"{"action":"refresh_stats","data":null}"#)
        .await;

    assert!(within(stats.recv()).await.unwrap().is_null());
    assert_eq!(channel.state(), ChannelState::Open);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_toggle_closes_then_reopens() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    let opens = count_opens(&channel);
    let mut closes = collect_closes(&channel);
    let mut issues = forward(&channel, "new_issue");

    // Closed -> Open
    channel.toggle().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();
    eventually(|| opens.load(Ordering::SeqCst) == 1).await;

    // Open -> Closed
    channel.toggle().await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(client.recv_close().await, Some(CLOSE_NORMAL));

    let event = within(closes.recv()).await.unwrap();
    assert!(event.initiated_locally);
    assert!(event.was_clean);
    assert_eq!(event.code, CLOSE_NORMAL);
    assert!(closes.try_recv().is_err());

    // Closed -> Open again, handlers kept
    assert!(channel.has_handler("new_issue"));
    channel.toggle().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();
    eventually(|| opens.load(Ordering::SeqCst) == 2).await;

    client
        .send_text(r#"{"action":"new_issue","data":{"id":"crash-1"}}"#)
        .await;
    assert_eq!(
        within(issues.recv()).await.unwrap()["id"].as_str(),
        Some("crash-1")
    );
}

#[tokio::test]
async fn test_refused_connection_lands_in_closed() {
    init_tracing();
    let port = unused_port().await;
    let channel = NotificationChannel::for_host(&format!("127.0.0.1:{port}")).unwrap();
    let opens = count_opens(&channel);
    let mut closes = collect_closes(&channel);

    channel.start().await;
    within(channel.wait_for(ChannelState::Closed)).await.unwrap();

    let event = within(closes.recv()).await.unwrap();
    assert_eq!(event.code, CLOSE_ABNORMAL);
    assert!(!event.was_clean);
    assert!(!event.initiated_locally);
    assert_eq!(opens.load(Ordering::SeqCst), 0);
    assert_eq!(channel.last_close(), Some(event));
}

#[tokio::test]
async fn test_restart_closes_previous_connection_first() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    let mut closes = collect_closes(&channel);
    let mut jobs = forward(&channel, "new_job");

    channel.start().await;
    let mut first = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();
    assert!(channel.last_close().is_none());

    channel.start().await;
    assert_eq!(first.recv_close().await, Some(CLOSE_NORMAL));
    let closed = within(closes.recv()).await.unwrap();
    assert!(closed.initiated_locally);

    let mut second = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();
    second
        .send_text(r#"{"action":"new_job","data":{"ident":2}}"#)
        .await;
    assert_eq!(within(jobs.recv()).await.unwrap()["ident"].as_u64(), Some(2));
}

#[tokio::test]
async fn test_remote_close_reports_code() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    let mut closes = collect_closes(&channel);

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client.close(CloseCode::Away, "shutting down").await;
    within(channel.wait_for(ChannelState::Closed)).await.unwrap();

    let event = within(closes.recv()).await.unwrap();
    assert_eq!(event.code, 1001);
    assert_eq!(event.reason, "shutting down");
    assert!(!event.initiated_locally);
}

#[tokio::test]
async fn test_remote_close_is_answered() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    let mut closes = collect_closes(&channel);

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client.close(CloseCode::Away, "bye").await;

    // The client echoes the close frame before dropping the socket.
    assert_eq!(client.recv_close().await, Some(1001));

    let event = within(closes.recv()).await.unwrap();
    assert_eq!(event.code, 1001);
    assert!(event.was_clean);
    assert!(!event.initiated_locally);
}

#[tokio::test]
async fn test_close_while_connecting_is_local() {
    init_tracing();
    // Accepts TCP but never answers the upgrade, so the handshake stalls.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let channel = NotificationChannel::for_host(&addr.to_string()).unwrap();
    let mut closes = collect_closes(&channel);

    channel.start().await;
    assert_eq!(channel.state(), ChannelState::Connecting);

    within(channel.close()).await;
    assert_eq!(channel.state(), ChannelState::Closed);
    let event = within(closes.recv()).await.unwrap();
    assert!(event.initiated_locally);
    assert_eq!(event.code, CLOSE_ABNORMAL);
}

// ============================================================================
// Outbound
// ============================================================================

#[tokio::test]
async fn test_send_reaches_server() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    channel
        .send(r#"{"action":"get_stats","data":{"limit":10}}"#)
        .await
        .unwrap();
    assert_eq!(
        client.recv_text().await,
        r#"{"action":"get_stats","data":{"limit":10}}"#
    );

    channel
        .send_json(&serde_json::json!({ "action": "cancel_job", "ident": 4 }))
        .await
        .unwrap();
    let text = client.recv_text().await;
    let sent: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(sent["action"], "cancel_job");
    assert_eq!(sent["ident"], 4);
}

#[tokio::test]
async fn test_send_after_close_fails() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();

    channel.start().await;
    let _client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();
    channel.close().await;

    let err = channel.send("{}").await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotConnected {
            state: ChannelState::Closed
        }
    ));
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test]
async fn test_reconnector_restarts_after_remote_close() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    let opens = count_opens(&channel);
    let reconnector = Reconnector::spawn(
        channel.clone(),
        Backoff::new(Duration::from_millis(10), Duration::from_millis(50)),
    );

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client.close(CloseCode::Away, "restart").await;
    let _client = server.next_client().await;

    eventually(|| opens.load(Ordering::SeqCst) >= 2).await;

    // A local close is not undone.
    channel.close().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(channel.state(), ChannelState::Closed);

    reconnector.stop().await;
}

#[tokio::test]
async fn test_reconnector_leaves_close_made_during_backoff() {
    init_tracing();
    let mut server = TestServer::bind().await;
    let channel = server.channel();
    let reconnector = Reconnector::spawn(
        channel.clone(),
        Backoff::new(Duration::from_millis(800), Duration::from_millis(800)).with_jitter(false),
    );

    channel.start().await;
    let mut client = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();

    client.close(CloseCode::Away, "restart").await;
    within(channel.wait_for(ChannelState::Closed)).await.unwrap();

    // Reopen and close by hand while the reconnector is still waiting.
    channel.toggle().await;
    let _second = server.next_client().await;
    within(channel.wait_for(ChannelState::Open)).await.unwrap();
    channel.toggle().await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.last_close().is_some_and(|event| event.initiated_locally));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(channel.state(), ChannelState::Closed);

    reconnector.stop().await;
}
