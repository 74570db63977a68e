//! Depth Feed - Market Depth Service Library
//!
//! This crate maintains the order book of one subscribed market from an
//! exchange WebSocket feed and publishes a fixed-size depth ladder plus the
//! latest ticker to a chart consumer on a steady cadence.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod publisher;
pub mod session;
pub mod websocket;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use market::{Currency, Market};
pub use metrics::FeedMetrics;
pub use orderbook::{AggregatedLevel, OrderBook, PriceLevelSet, Side};
pub use parser::{ControlFrame, FeedMessage, L2Update, LevelChange, PriceLevel, Snapshot, Ticker};
pub use publisher::{ConsumerMessage, ConsumerSink, DepthSnapshot, SnapshotPublisher};
pub use session::{MarketSession, SessionHandle};
pub use websocket::{ConnectionState, StreamConnection, StreamHandle};

/// Application state shared across components
pub struct AppState {
    pub session: SessionHandle,
    pub stream: StreamHandle,
    pub metrics: FeedMetrics,
    pub config: Arc<Config>,
}
