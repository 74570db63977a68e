//! Error types for the depth feed

use thiserror::Error;

/// Depth feed errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for MarketDataError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        MarketDataError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(err: std::io::Error) -> Self {
        MarketDataError::IpcError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
