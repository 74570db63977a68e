//! WebSocket module for the upstream feed connection

mod backoff;
mod client;
mod connection;
mod state;

pub use backoff::Backoff;
pub use client::{Incoming, WebSocketClient};
pub use connection::{ConnectionCommand, StreamConnection, StreamHandle, FEED_CHANNEL_CAPACITY};
pub use state::{ConnectionCore, ConnectionState, ErrorAction};
