//! Upstream stream connection
//!
//! One task owns the feed socket. It queues control frames while the socket
//! is not open, reconnects with backoff after the host drops it, and forwards
//! parsed frames to the session.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::client::{Incoming, WebSocketClient};
use super::state::{ConnectionCore, ConnectionState, ErrorAction};
use super::Backoff;
use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::metrics::FeedMetrics;
use crate::parser::{ControlFrame, FeedMessage};

/// Capacity of the channel carrying parsed frames to the session
pub const FEED_CHANNEL_CAPACITY: usize = 4096;

/// Requests accepted by the connection task
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Transmit now, or queue until the socket opens
    Send(ControlFrame),
    /// Transmit only if open; never queued
    SendIfOpen(ControlFrame),
    /// Connect now unless already connecting or open
    Connect,
    /// Close without reconnecting
    Close,
    State(oneshot::Sender<ConnectionState>),
    Shutdown,
}

/// Cloneable handle to the connection task
#[derive(Debug, Clone)]
pub struct StreamHandle {
    tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl StreamHandle {
    pub fn new(tx: mpsc::UnboundedSender<ConnectionCommand>) -> Self {
        Self { tx }
    }

    pub fn send(&self, frame: ControlFrame) -> Result<()> {
        self.command(ConnectionCommand::Send(frame))
    }

    pub fn send_if_open(&self, frame: ControlFrame) -> Result<()> {
        self.command(ConnectionCommand::SendIfOpen(frame))
    }

    pub fn connect(&self) -> Result<()> {
        self.command(ConnectionCommand::Connect)
    }

    pub fn close(&self) -> Result<()> {
        self.command(ConnectionCommand::Close)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.command(ConnectionCommand::Shutdown)
    }

    pub async fn state(&self) -> Result<ConnectionState> {
        let (reply, rx) = oneshot::channel();
        self.command(ConnectionCommand::State(reply))?;
        rx.await
            .map_err(|_| MarketDataError::ChannelClosed("connection state reply"))
    }

    fn command(&self, command: ConnectionCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| MarketDataError::ChannelClosed("connection commands"))
    }
}

/// Owner of the upstream socket
pub struct StreamConnection {
    endpoint: String,
    core: ConnectionCore,
    commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    feed: mpsc::Sender<FeedMessage>,
    client: Option<WebSocketClient>,
    connecting: Option<JoinHandle<Result<WebSocketClient>>>,
    retry_at: Option<Instant>,
    idle_timeout: Duration,
    last_message: Instant,
    metrics: FeedMetrics,
}

impl StreamConnection {
    /// Start the connection task; parsed frames are delivered on `feed`
    pub fn spawn(
        config: &Config,
        feed: mpsc::Sender<FeedMessage>,
        metrics: FeedMetrics,
    ) -> (StreamHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::unbounded_channel();
        let connection = Self {
            endpoint: config.ws_endpoint.clone(),
            core: ConnectionCore::new(Backoff::new(config.reconnect_base(), config.reconnect_max())),
            commands,
            feed,
            client: None,
            connecting: None,
            retry_at: None,
            idle_timeout: config.idle_timeout(),
            last_message: Instant::now(),
            metrics,
        };

        let task = tokio::spawn(connection.run());
        (StreamHandle::new(tx), task)
    }

    async fn run(mut self) {
        info!(endpoint = %self.endpoint, "Starting stream connection");

        let mut keepalive = interval(self.idle_timeout.max(Duration::from_millis(100)));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ConnectionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                result = poll_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }
                incoming = recv_from(&mut self.client) => {
                    self.on_incoming(incoming).await;
                }
                _ = retry_timer(self.retry_at) => {
                    self.retry_at = None;
                    if self.core.retry_due() {
                        info!("Reconnecting after host close");
                        self.start_connect();
                    }
                }
                _ = keepalive.tick(), if self.client.is_some() => {
                    self.keepalive().await;
                }
            }
        }

        self.close_locally().await;
        info!("Stream connection stopped");
    }

    async fn handle_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Send(frame) => match self.core.send(frame) {
                Some(frame) => self.transmit(frame, true).await,
                None => debug!(state = %self.core.state(), "Queued control frame"),
            },
            ConnectionCommand::SendIfOpen(frame) => {
                if let Some(frame) = self.core.send_if_open(frame) {
                    self.transmit(frame, false).await;
                }
            }
            ConnectionCommand::Connect => {
                if self.core.request_connect() {
                    self.retry_at = None;
                    self.start_connect();
                }
            }
            ConnectionCommand::Close => self.close_locally().await,
            ConnectionCommand::State(reply) => {
                let _ = reply.send(self.core.state());
            }
            ConnectionCommand::Shutdown => {}
        }
    }

    fn start_connect(&mut self) {
        self.connecting = Some(tokio::spawn(WebSocketClient::connect(self.endpoint.clone())));
    }

    async fn on_connect_result(&mut self, result: Result<WebSocketClient>) {
        match result {
            Ok(client) => {
                let endpoint = client.endpoint().to_string();
                self.client = Some(client);
                self.last_message = Instant::now();
                self.metrics.set_connection_open(true);

                let mut pending = self.core.on_open().into_iter();
                info!(endpoint = %endpoint, pending = pending.len(), "Feed socket open, replaying queued frames");

                while let Some(frame) = pending.next() {
                    if let Err(e) = self.write(&frame).await {
                        warn!(error = %e, "Failed to replay control frame");
                        self.force_close().await;
                        // Socket is gone again; keep the rest for the next open
                        self.core.send(frame);
                        for frame in pending.by_ref() {
                            self.core.send(frame);
                        }
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Feed connection attempt failed");
                self.handle_close();
            }
        }
    }

    async fn on_incoming(&mut self, incoming: Result<Incoming>) {
        match incoming {
            Ok(Incoming::Text(text)) => {
                self.last_message = Instant::now();
                self.route(&text).await;
            }
            Ok(Incoming::Control) => {
                self.last_message = Instant::now();
            }
            Ok(Incoming::Closed(reason)) => {
                info!(reason = ?reason, "Feed socket closed by host");
                self.client = None;
                self.handle_close();
            }
            Err(e) => match self.core.on_error() {
                ErrorAction::ForceClose => {
                    warn!(error = %e, "Socket encountered error, closing socket");
                    self.force_close().await;
                }
                // Not reached today: a client only exists while Open
                ErrorAction::DropSocket => {
                    debug!(error = %e, "Dropping dead socket");
                    self.client = None;
                }
            },
        }
    }

    /// Parse a frame and forward it to the session
    async fn route(&mut self, raw: &str) {
        let message = match FeedMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        self.metrics.frame(message.kind());
        match message {
            FeedMessage::Unknown(kind) => {
                trace!(kind = %kind, "Ignoring frame type");
            }
            FeedMessage::Error(err) => {
                warn!(message = %err.message, reason = ?err.reason, "Feed reported an error");
            }
            message => {
                if self.feed.send(message).await.is_err() {
                    debug!("Session gone, dropping frame");
                }
            }
        }
    }

    /// Write now; on failure `requeue` decides whether the frame waits for
    /// the next open
    async fn transmit(&mut self, frame: ControlFrame, requeue: bool) {
        if let Err(e) = self.write(&frame).await {
            warn!(error = %e, "Failed to send control frame");
            self.force_close().await;
            if requeue {
                self.core.send(frame);
            }
        }
    }

    async fn write(&mut self, frame: &ControlFrame) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".to_string()))?;
        let text = frame.to_json()?;
        client.send_text(text).await?;
        self.core.sent(frame);
        debug!(kind = ?frame.kind, products = ?frame.product_ids, "Sent control frame");
        Ok(())
    }

    async fn keepalive(&mut self) {
        if self.last_message.elapsed() < self.idle_timeout {
            return;
        }

        warn!(
            last_message_secs = self.last_message.elapsed().as_secs(),
            "No message received within timeout, sending keepalive"
        );
        let sent = match self.client.as_mut() {
            Some(client) => client.ping().await,
            None => return,
        };
        if let Err(e) = sent {
            warn!(error = %e, "Failed to send keepalive ping, reconnecting");
            self.force_close().await;
        }
    }

    /// Close an open socket after an error; reconnect follows the backoff
    async fn force_close(&mut self) {
        if let Some(client) = self.client.take() {
            client.close().await;
        }
        self.handle_close();
    }

    /// Close event not requested locally
    fn handle_close(&mut self) {
        self.client = None;
        self.metrics.set_connection_open(false);

        match self.core.on_close() {
            Some(delay) => {
                self.metrics.reconnect_scheduled();
                info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
                self.retry_at = Some(Instant::now() + delay);
            }
            None => {
                warn!("Reconnect backoff exhausted, waiting for the next subscribe");
                self.retry_at = None;
            }
        }
    }

    async fn close_locally(&mut self) {
        let previous = self.core.close_locally();
        self.retry_at = None;
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        if let Some(client) = self.client.take() {
            client.close().await;
        }
        self.metrics.set_connection_open(false);
        debug!(previous = %previous, "Feed socket closed locally");
    }
}

async fn poll_connect(
    connecting: &mut Option<JoinHandle<Result<WebSocketClient>>>,
) -> Result<WebSocketClient> {
    match connecting.as_mut() {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(MarketDataError::WebSocketConnection(e.to_string())),
        },
        None => std::future::pending().await,
    }
}

async fn recv_from(client: &mut Option<WebSocketClient>) -> Result<Incoming> {
    match client.as_mut() {
        Some(client) => client.recv().await,
        None => std::future::pending().await,
    }
}

async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
