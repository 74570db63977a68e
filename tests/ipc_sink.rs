//! Length-prefixed MessagePack delivery over a Unix socket

use depth_feed::publisher::{BookMessage, ConsumerMessage, IpcPublisher};
use depth_feed::AggregatedLevel;
use rust_decimal_macros::dec;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};

async fn read_frame(stream: &mut UnixStream) -> serde_json::Value {
    let len = stream.read_u32().await.unwrap() as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    rmp_serde::from_slice(&body).unwrap()
}

fn book() -> ConsumerMessage {
    ConsumerMessage::Book(BookMessage {
        max_depth: dec!(19530.3),
        asks: vec![AggregatedLevel {
            price: dec!(0.00042),
            size: dec!(100.4),
        }],
        bids: vec![AggregatedLevel {
            price: dec!(0.00042),
            size: dec!(19530.3),
        }],
    })
}

#[tokio::test]
async fn frames_reach_listening_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("depth.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let publisher = IpcPublisher::new(path.to_str().unwrap()).await;
    let (mut consumer, _) = listener.accept().await.unwrap();

    publisher.publish(&book()).await.unwrap();
    publisher.publish(&book()).await.unwrap();

    for _ in 0..2 {
        let frame = read_frame(&mut consumer).await;
        assert_eq!(frame["type"], "BOOK");
        assert_eq!(frame["maxDepth"], serde_json::json!(19530.3));
        assert_eq!(frame["asks"][0]["bucketPrice"], "0.00042");
        assert_eq!(frame["bids"][0]["aggregatedSize"], "19530.3");
    }
}

#[tokio::test]
async fn missing_consumer_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.sock");

    let publisher = IpcPublisher::new(path.to_str().unwrap()).await;
    assert!(publisher.publish(&book()).await.is_ok());

    // Consumer appears later and the next publish connects lazily
    let listener = UnixListener::bind(&path).unwrap();
    publisher.publish(&book()).await.unwrap();
    let (mut consumer, _) = listener.accept().await.unwrap();

    let frame = read_frame(&mut consumer).await;
    assert_eq!(frame["type"], "BOOK");
}
