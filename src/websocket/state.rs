//! Connection state machine
//!
//! Pure transition logic for the upstream socket: which frames go out now,
//! which wait in the pending queue, and when to reconnect. The async driver in
//! `connection.rs` performs the I/O each transition asks for.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use super::Backoff;
use crate::parser::{ControlFrame, ControlKind, CHANNELS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no reconnect scheduled
    Disconnected,
    /// Handshake in flight
    Connecting,
    Open,
    /// Remote side closed the socket; a reconnect is scheduled
    ClosingByHost,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::ClosingByHost => write!(f, "CLOSING_BY_HOST"),
        }
    }
}

/// What to do with the socket after an error event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Close the open socket; the close handling schedules the reconnect
    ForceClose,
    /// Forget the dead socket without scheduling anything
    DropSocket,
}

#[derive(Debug)]
pub struct ConnectionCore {
    state: ConnectionState,
    pending: VecDeque<ControlFrame>,
    backoff: Backoff,
    /// Products the feed currently streams to us
    subscribed: Vec<String>,
    /// Products to subscribe again after the host dropped the socket
    restore: Vec<String>,
}

impl ConnectionCore {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            pending: VecDeque::new(),
            backoff,
            subscribed: Vec::new(),
            restore: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pending(&self) -> impl Iterator<Item = &ControlFrame> {
        self.pending.iter()
    }

    /// Frame to transmit now; queued and `None` unless the socket is open
    pub fn send(&mut self, frame: ControlFrame) -> Option<ControlFrame> {
        if self.state == ConnectionState::Open {
            Some(frame)
        } else {
            self.pending.push_back(frame);
            None
        }
    }

    /// Frame to transmit now, or nothing at all when not open.
    ///
    /// When not open, queued subscribes for the frame's products are dropped
    /// so a cancelled subscription never reaches the feed.
    pub fn send_if_open(&mut self, frame: ControlFrame) -> Option<ControlFrame> {
        if self.state == ConnectionState::Open {
            return Some(frame);
        }

        let cancelled = frame.product_ids;
        self.restore.retain(|id| !cancelled.contains(id));
        self.pending.retain_mut(|queued| {
            if queued.kind != ControlKind::Subscribe {
                return true;
            }
            queued.product_ids.retain(|id| !cancelled.contains(id));
            !queued.product_ids.is_empty()
        });
        None
    }

    /// Explicit connect request; true when a connection attempt should start
    pub fn request_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::ClosingByHost => {
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Connecting | ConnectionState::Open => false,
        }
    }

    /// Scheduled retry fired; true when a connection attempt should start
    pub fn retry_due(&mut self) -> bool {
        if self.state == ConnectionState::ClosingByHost {
            self.state = ConnectionState::Connecting;
            true
        } else {
            false
        }
    }

    /// Record a frame the feed accepted
    pub fn sent(&mut self, frame: &ControlFrame) {
        match frame.kind {
            ControlKind::Subscribe => {
                for id in &frame.product_ids {
                    if !self.subscribed.contains(id) {
                        self.subscribed.push(id.clone());
                    }
                }
            }
            ControlKind::Unsubscribe => self.subscribed.retain(|id| !frame.product_ids.contains(id)),
        }
    }

    pub fn subscribed(&self) -> &[String] {
        &self.subscribed
    }

    /// Socket opened: frames queued while disconnected, oldest first.
    ///
    /// After a host close, products that were streaming and are not touched
    /// by a queued frame get one trailing subscribe.
    pub fn on_open(&mut self) -> Vec<ControlFrame> {
        self.state = ConnectionState::Open;
        self.backoff.reset();

        let mut frames: Vec<ControlFrame> = self.pending.drain(..).collect();
        let restore: Vec<String> = std::mem::take(&mut self.restore)
            .into_iter()
            .filter(|id| !frames.iter().any(|f| f.product_ids.contains(id)))
            .collect();
        if !restore.is_empty() {
            frames.push(ControlFrame {
                kind: ControlKind::Subscribe,
                product_ids: restore,
                channels: CHANNELS.iter().map(|c| c.to_string()).collect(),
            });
        }
        frames
    }

    /// Socket closed without being asked to; returns the reconnect delay
    pub fn on_close(&mut self) -> Option<Duration> {
        let dropped = std::mem::take(&mut self.subscribed);
        for id in dropped {
            if !self.restore.contains(&id) {
                self.restore.push(id);
            }
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                self.state = ConnectionState::ClosingByHost;
                Some(delay)
            }
            None => {
                self.state = ConnectionState::Disconnected;
                None
            }
        }
    }

    pub fn on_error(&self) -> ErrorAction {
        if self.state == ConnectionState::Open {
            ErrorAction::ForceClose
        } else {
            ErrorAction::DropSocket
        }
    }

    /// Local close: no reconnect follows. Returns the state before closing.
    pub fn close_locally(&mut self) -> ConnectionState {
        let previous = self.state;
        self.state = ConnectionState::Disconnected;
        self.backoff.reset();
        self.subscribed.clear();
        self.restore.clear();
        previous
    }
}
