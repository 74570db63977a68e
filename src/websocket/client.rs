//! WebSocket client for the upstream feed
//!
//! Handles the handshake, outbound text frames and message reception.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One inbound event from the socket
#[derive(Debug)]
pub enum Incoming {
    Text(String),
    /// Ping/pong or raw frame, nothing to route
    Control,
    /// Close frame received or stream ended
    Closed(Option<String>),
}

/// WebSocket client for a single open connection
pub struct WebSocketClient {
    stream: WsStream,
    endpoint: String,
}

impl WebSocketClient {
    /// Connect to the WebSocket endpoint
    pub async fn connect(endpoint: String) -> Result<Self> {
        info!(url = %endpoint, "Connecting to feed WebSocket");

        let (stream, response) = connect_async(endpoint.as_str()).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");
        Ok(Self { stream, endpoint })
    }

    /// Send a text frame
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        debug!(len = text.len(), "Sending text message");
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))
    }

    /// Receive the next message
    pub async fn recv(&mut self) -> Result<Incoming> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Incoming::Text(text)),
            Some(Ok(Message::Binary(data))) => {
                // Convert binary to text if needed
                Ok(Incoming::Text(String::from_utf8_lossy(&data).to_string()))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                let _ = self.stream.send(Message::Pong(data)).await;
                Ok(Incoming::Control)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(Incoming::Control)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                Ok(Incoming::Closed(frame.map(|f| f.reason.to_string())))
            }
            Some(Ok(Message::Frame(_))) => Ok(Incoming::Control),
            Some(Err(e)) => Err(MarketDataError::WebSocketMessage(e.to_string())),
            None => {
                warn!("WebSocket stream ended");
                Ok(Incoming::Closed(None))
            }
        }
    }

    /// Send a ping to keep connection alive
    pub async fn ping(&mut self) -> Result<()> {
        self.stream
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Close the connection
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
