//! Publisher module
//!
//! Samples the live book on a fixed interval and delivers ticker and depth
//! messages to the chart consumer, independent of the feed's tick rate.

mod ipc;

pub use ipc::IpcPublisher;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::error::{MarketDataError, Result};
use crate::metrics::FeedMetrics;
use crate::orderbook::precision::precision_for_price;
use crate::orderbook::{AggregatedLevel, OrderBook, Side};
use crate::parser::Ticker;
use crate::session::SessionHandle;

/// Immutable view of the book taken at one sampling tick
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSnapshot {
    pub ticker: Option<Ticker>,
    pub precision: u32,
    pub max_depth: Decimal,
    pub asks: Vec<AggregatedLevel>,
    pub bids: Vec<AggregatedLevel>,
}

impl DepthSnapshot {
    /// Aggregate both sides at the precision implied by the last ticker
    pub fn from_book(book: &OrderBook, depth: usize, min_precision: u32) -> Self {
        let ticker = book.last_ticker().cloned();
        let precision = ticker
            .as_ref()
            .map(|t| precision_for_price(t.price, min_precision))
            .unwrap_or(min_precision);

        let asks = book.top_levels(Side::Ask, depth, precision);
        let bids = book.top_levels(Side::Bid, depth, precision);
        let max_depth = asks
            .iter()
            .chain(bids.iter())
            .map(|level| level.size)
            .max()
            .unwrap_or(Decimal::ZERO);

        Self {
            ticker,
            precision,
            max_depth,
            asks,
            bids,
        }
    }

    /// Messages for the consumer: the ticker (if any) followed by the book
    pub fn into_messages(self) -> Vec<ConsumerMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ticker) = self.ticker {
            messages.push(ConsumerMessage::Ticker(TickerMessage {
                price: ticker.price,
                high_24h: ticker.high_24h,
                low_24h: ticker.low_24h,
                open_24h: ticker.open_24h,
            }));
        }
        messages.push(ConsumerMessage::Book(BookMessage {
            max_depth: self.max_depth,
            asks: self.asks,
            bids: self.bids,
        }));
        messages
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerMessage {
    pub price: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub open_24h: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMessage {
    #[serde(rename = "maxDepth", with = "rust_decimal::serde::float")]
    pub max_depth: Decimal,
    pub asks: Vec<AggregatedLevel>,
    pub bids: Vec<AggregatedLevel>,
}

/// Message delivered to the chart consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConsumerMessage {
    #[serde(rename = "TICKER")]
    Ticker(TickerMessage),
    #[serde(rename = "BOOK")]
    Book(BookMessage),
}

/// Where sampled messages go
pub enum ConsumerSink {
    /// In-process consumer
    Channel(mpsc::Sender<ConsumerMessage>),
    /// Length-prefixed MessagePack over a Unix socket
    Ipc(IpcPublisher),
    /// No consumer attached; messages are logged
    Log,
}

impl ConsumerSink {
    async fn deliver(&self, message: ConsumerMessage) -> Result<()> {
        match self {
            ConsumerSink::Channel(tx) => tx
                .send(message)
                .await
                .map_err(|_| MarketDataError::ChannelClosed("consumer")),
            ConsumerSink::Ipc(publisher) => publisher.publish(&message).await,
            ConsumerSink::Log => {
                debug!(message = ?message, "Depth sample");
                Ok(())
            }
        }
    }
}

/// Fixed-interval sampler of the current book
pub struct SnapshotPublisher {
    session: SessionHandle,
    sink: ConsumerSink,
    interval: Duration,
    metrics: FeedMetrics,
}

impl SnapshotPublisher {
    pub fn new(
        session: SessionHandle,
        sink: ConsumerSink,
        interval: Duration,
        metrics: FeedMetrics,
    ) -> Self {
        Self {
            session,
            sink,
            interval,
            metrics,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "Starting snapshot publisher");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.publish_once().await {
                Ok(_) => {}
                Err(MarketDataError::ChannelClosed(what)) => {
                    info!(channel = what, "Stopping snapshot publisher");
                    break;
                }
                Err(e) => debug!(error = %e, "Failed to publish depth sample"),
            }
        }
    }

    /// Sample whichever book is current and deliver it.
    ///
    /// Returns false when no market is subscribed.
    pub async fn publish_once(&self) -> Result<bool> {
        let Some(snapshot) = self.session.sample().await? else {
            trace!("No market subscribed, nothing to publish");
            return Ok(false);
        };

        for message in snapshot.into_messages() {
            self.sink.deliver(message).await?;
        }
        self.metrics.snapshot_published();
        Ok(true)
    }
}
