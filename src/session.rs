//! Market session
//!
//! The session task is the only owner of the live order book. It turns
//! market changes into subscribe/unsubscribe frames, applies feed frames for
//! the current product and answers sampling requests from the publisher.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::{MarketDataError, Result};
use crate::market::Market;
use crate::orderbook::OrderBook;
use crate::parser::{ControlFrame, FeedMessage};
use crate::publisher::DepthSnapshot;
use crate::websocket::StreamHandle;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Requests accepted by the session task
#[derive(Debug)]
pub enum SessionCommand {
    SetMarket(Market, oneshot::Sender<Result<()>>),
    ClearMarket(oneshot::Sender<Result<()>>),
    Sample(oneshot::Sender<Option<DepthSnapshot>>),
    CurrentMarket(oneshot::Sender<Option<Market>>),
    Shutdown,
}

/// Cloneable handle to the session task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Subscribe to `market`, replacing any current subscription
    pub async fn set_market(&self, market: Market) -> Result<()> {
        self.request(|reply| SessionCommand::SetMarket(market, reply))
            .await?
    }

    /// Drop the current subscription
    pub async fn clear_market(&self) -> Result<()> {
        self.request(SessionCommand::ClearMarket).await?
    }

    /// Depth snapshot of the current book, `None` without a subscription
    pub async fn sample(&self) -> Result<Option<DepthSnapshot>> {
        self.request(SessionCommand::Sample).await
    }

    pub async fn current_market(&self) -> Result<Option<Market>> {
        self.request(SessionCommand::CurrentMarket).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| MarketDataError::ChannelClosed("session commands"))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| MarketDataError::ChannelClosed("session commands"))?;
        rx.await
            .map_err(|_| MarketDataError::ChannelClosed("session reply"))
    }
}

/// The live subscription and the book bound to it
#[derive(Debug)]
struct Subscription {
    market: Market,
    product_id: String,
    book: OrderBook,
}

pub struct MarketSession {
    stream: StreamHandle,
    commands: mpsc::Receiver<SessionCommand>,
    feed: mpsc::Receiver<FeedMessage>,
    current: Option<Subscription>,
    depth_levels: usize,
    min_precision: u32,
}

impl MarketSession {
    pub fn new(
        stream: StreamHandle,
        feed: mpsc::Receiver<FeedMessage>,
        depth_levels: usize,
        min_precision: u32,
    ) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let session = Self {
            stream,
            commands,
            feed,
            current: None,
            depth_levels,
            min_precision,
        };
        (session, SessionHandle { tx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = self.feed.recv() => self.apply(message),
            }
        }

        if let Err(e) = self.clear_market() {
            debug!(error = %e, "Connection already gone at session shutdown");
        }
        info!("Market session stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetMarket(market, reply) => {
                let _ = reply.send(self.set_market(market));
            }
            SessionCommand::ClearMarket(reply) => {
                let _ = reply.send(self.clear_market());
            }
            SessionCommand::Sample(reply) => {
                let _ = reply.send(self.sample());
            }
            SessionCommand::CurrentMarket(reply) => {
                let _ = reply.send(self.current.as_ref().map(|s| s.market));
            }
            SessionCommand::Shutdown => {}
        }
    }

    /// Switch the subscription to `market` with a fresh, empty book.
    ///
    /// Unmapped markets are rejected before anything is sent upstream.
    pub fn set_market(&mut self, market: Market) -> Result<()> {
        let product_id = market.product_id()?;

        if let Some(previous) = self.current.take() {
            info!(market = %previous.market, product = %previous.product_id, "Unsubscribing");
            self.stream
                .send(ControlFrame::unsubscribe(vec![previous.product_id]))?;
        }

        self.stream.send(ControlFrame::subscribe(product_id))?;
        self.stream.connect()?;

        info!(market = %market, product = %product_id, "Subscribed market");
        self.current = Some(Subscription {
            market,
            product_id: product_id.to_string(),
            book: OrderBook::new(product_id),
        });
        Ok(())
    }

    /// Release the book; the unsubscribe only goes out on an open socket
    pub fn clear_market(&mut self) -> Result<()> {
        if let Some(previous) = self.current.take() {
            info!(market = %previous.market, "Clearing market");
            self.stream
                .send_if_open(ControlFrame::unsubscribe(vec![previous.product_id]))?;
        }
        Ok(())
    }

    /// Apply a feed frame to the current book
    pub fn apply(&mut self, message: FeedMessage) {
        let Some(subscription) = self.current.as_mut() else {
            trace!(kind = message.kind(), "No subscription, dropping frame");
            return;
        };
        if message.product_id() != Some(subscription.product_id.as_str()) {
            trace!(kind = message.kind(), product = ?message.product_id(), "Stale product, dropping frame");
            return;
        }

        let book = &mut subscription.book;
        match message {
            FeedMessage::Snapshot(snapshot) => {
                book.apply_snapshot(&snapshot.bids, &snapshot.asks);
                debug!(
                    product = %snapshot.product_id,
                    bids = snapshot.bids.len(),
                    asks = snapshot.asks.len(),
                    "Applied snapshot"
                );
            }
            FeedMessage::Update(update) => {
                if !book.apply_diff(&update.changes) {
                    trace!(product = %update.product_id, "Update before snapshot, dropped");
                }
            }
            FeedMessage::Ticker(ticker) => book.apply_ticker(ticker),
            FeedMessage::Error(_) | FeedMessage::Unknown(_) => {}
        }
    }

    /// Depth snapshot of the current book
    pub fn sample(&self) -> Option<DepthSnapshot> {
        self.current
            .as_ref()
            .map(|s| DepthSnapshot::from_book(&s.book, self.depth_levels, self.min_precision))
    }

    pub fn book(&self) -> Option<&OrderBook> {
        self.current.as_ref().map(|s| &s.book)
    }

    pub fn market(&self) -> Option<Market> {
        self.current.as_ref().map(|s| s.market)
    }
}
