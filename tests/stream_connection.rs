//! Drives a StreamConnection against a local WebSocket server

use std::time::Duration;

use depth_feed::websocket::ConnectionState;
use depth_feed::{Config, ControlFrame, FeedMessage, FeedMetrics, StreamConnection};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn config(url: String) -> Config {
    Config {
        ws_endpoint: url,
        reconnect_base_ms: 20,
        reconnect_max_ms: 320,
        ..Config::default()
    }
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    accept_async(tcp).await.unwrap()
}

async fn next_frame(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn describe(frame: &Value) -> (String, String) {
    (
        frame["type"].as_str().unwrap().to_string(),
        frame["product_ids"][0].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn queued_frames_go_out_first_on_open() {
    let (listener, url) = listen().await;
    let (feed_tx, _feed_rx) = mpsc::channel(16);
    let (handle, task) = StreamConnection::spawn(&config(url), feed_tx, FeedMetrics::new().unwrap());

    assert_eq!(handle.state().await.unwrap(), ConnectionState::Disconnected);

    handle.send(ControlFrame::subscribe("ETH-BTC")).unwrap();
    handle
        .send(ControlFrame::unsubscribe(vec!["ETH-BTC".to_string()]))
        .unwrap();
    handle.send(ControlFrame::subscribe("BCH-BTC")).unwrap();
    handle.connect().unwrap();

    let mut ws = accept(&listener).await;
    assert_eq!(describe(&next_frame(&mut ws).await), ("subscribe".into(), "ETH-BTC".into()));
    assert_eq!(describe(&next_frame(&mut ws).await), ("unsubscribe".into(), "ETH-BTC".into()));
    assert_eq!(describe(&next_frame(&mut ws).await), ("subscribe".into(), "BCH-BTC".into()));

    handle
        .send(ControlFrame::unsubscribe(vec!["BCH-BTC".to_string()]))
        .unwrap();
    let frame = next_frame(&mut ws).await;
    assert_eq!(describe(&frame), ("unsubscribe".into(), "BCH-BTC".into()));
    assert_eq!(frame["channels"], serde_json::json!(["level2", "ticker"]));

    assert_eq!(handle.state().await.unwrap(), ConnectionState::Open);

    handle.shutdown().unwrap();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn inbound_frames_are_routed_by_type() {
    let (listener, url) = listen().await;
    let (feed_tx, mut feed_rx) = mpsc::channel(16);
    let (handle, task) = StreamConnection::spawn(&config(url), feed_tx, FeedMetrics::new().unwrap());

    handle.send(ControlFrame::subscribe("ETH-BTC")).unwrap();
    handle.connect().unwrap();
    let mut ws = accept(&listener).await;
    next_frame(&mut ws).await;

    let frames = [
        r#"{"type":"subscriptions","channels":[]}"#,
        r#"{"type":"snapshot","product_id":"ETH-BTC","bids":[["0.000415","19530.3"]],"asks":[["0.00042108","500.00"]]}"#,
        r#"{"type":"heartbeat","sequence":7}"#,
        r#"{"type":"l2update","product_id":"ETH-BTC","changes":[["buy","bad","1"]]}"#,
        r#"{"type":"l2update","product_id":"ETH-BTC","time":"t","changes":[["sell","0.00041600","100.4"]]}"#,
        r#"{"type":"ticker","product_id":"ETH-BTC","price":"0.00042","high_24h":"0.00045","low_24h":"0.0004","open_24h":"0.00041"}"#,
    ];
    for frame in frames {
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let message = timeout(WAIT, feed_rx.recv()).await.unwrap().unwrap();
        kinds.push(message.kind());
        if let FeedMessage::Update(update) = &message {
            assert_eq!(update.changes.len(), 1);
        }
    }
    assert_eq!(kinds, vec!["snapshot", "l2update", "ticker"]);

    handle.shutdown().unwrap();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn host_close_reconnects_and_restores_subscription() {
    let (listener, url) = listen().await;
    let (feed_tx, _feed_rx) = mpsc::channel(16);
    let (handle, task) = StreamConnection::spawn(&config(url), feed_tx, FeedMetrics::new().unwrap());

    handle.send(ControlFrame::subscribe("ETH-BTC")).unwrap();
    handle.connect().unwrap();

    let mut ws = accept(&listener).await;
    assert_eq!(describe(&next_frame(&mut ws).await), ("subscribe".into(), "ETH-BTC".into()));
    ws.close(None).await.unwrap();
    drop(ws);

    // Retry fires after the base delay without any further command
    let mut ws = accept(&listener).await;
    assert_eq!(describe(&next_frame(&mut ws).await), ("subscribe".into(), "ETH-BTC".into()));

    handle.shutdown().unwrap();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelled_subscription_is_never_sent() {
    let (listener, url) = listen().await;
    let (feed_tx, _feed_rx) = mpsc::channel(16);
    let (handle, task) = StreamConnection::spawn(&config(url), feed_tx, FeedMetrics::new().unwrap());

    handle.send(ControlFrame::subscribe("ETH-BTC")).unwrap();
    handle
        .send_if_open(ControlFrame::unsubscribe(vec!["ETH-BTC".to_string()]))
        .unwrap();
    handle.connect().unwrap();

    let mut ws = accept(&listener).await;
    handle.send(ControlFrame::subscribe("BCH-BTC")).unwrap();

    // First frame on the wire is the later subscribe; nothing was queued
    assert_eq!(describe(&next_frame(&mut ws).await), ("subscribe".into(), "BCH-BTC".into()));

    handle.shutdown().unwrap();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn local_close_does_not_reconnect() {
    let (listener, url) = listen().await;
    let (feed_tx, _feed_rx) = mpsc::channel(16);
    let (handle, task) = StreamConnection::spawn(&config(url), feed_tx, FeedMetrics::new().unwrap());

    handle.send(ControlFrame::subscribe("ETH-BTC")).unwrap();
    handle.connect().unwrap();
    let mut ws = accept(&listener).await;
    next_frame(&mut ws).await;

    handle.close().unwrap();
    assert_eq!(handle.state().await.unwrap(), ConnectionState::Disconnected);

    // Several base delays pass without a new connection attempt
    assert!(timeout(Duration::from_millis(200), listener.accept()).await.is_err());

    handle.shutdown().unwrap();
    timeout(WAIT, task).await.unwrap().unwrap();
}
