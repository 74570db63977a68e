//! Unix socket sink for the chart consumer
//!
//! Each message is a 4-byte big-endian length followed by its MessagePack
//! encoding.

use bytes::{BufMut, Bytes, BytesMut};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::ConsumerMessage;
use crate::error::{MarketDataError, Result};

/// Publisher for sending consumer messages via Unix socket
pub struct IpcPublisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl IpcPublisher {
    /// Create a new publisher
    pub async fn new(socket_path: &str) -> Self {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        // Try initial connection (the consumer may not be up yet)
        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        publisher
    }

    /// Connect to the Unix socket
    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(MarketDataError::IpcError(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            MarketDataError::IpcError(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        let mut guard = self.stream.lock().await;
        *guard = Some(stream);

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    /// Publish one consumer message
    pub async fn publish(&self, message: &ConsumerMessage) -> Result<()> {
        let frame = encode_frame(message)?;

        let mut guard = self.stream.lock().await;

        // Check if we need to reconnect
        if guard.is_none() {
            drop(guard);
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Failed to reconnect to IPC socket");
                return Ok(()); // Don't fail on publish errors
            }
            guard = self.stream.lock().await;
        }

        if let Some(stream) = guard.as_mut() {
            if let Err(e) = stream.write_all(&frame).await {
                warn!(error = %e, "Failed to write to IPC socket");
                *guard = None; // Mark as disconnected
            }
        }

        Ok(())
    }
}

/// Length-prefixed MessagePack frame
pub fn encode_frame(message: &ConsumerMessage) -> Result<Bytes> {
    let data = rmp_serde::to_vec_named(message)?;
    let len = u32::try_from(data.len())
        .map_err(|_| MarketDataError::SerializationError("message too large".to_string()))?;

    let mut frame = BytesMut::with_capacity(4 + data.len());
    frame.put_u32(len);
    frame.put_slice(&data);
    Ok(frame.freeze())
}
