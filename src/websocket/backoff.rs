//! Reconnect backoff
//!
//! Doubles the wait after every unrequested close until it passes the
//! ceiling; the close after that resets the wait and gives up until the next
//! explicit connect.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    wait: Duration,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling,
            wait: base,
        }
    }

    /// Delay for the next reconnect, or `None` once the ceiling was exceeded
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.wait > self.ceiling {
            self.reset();
            return None;
        }

        let delay = self.wait;
        self.wait = self.wait.saturating_mul(2);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.wait = self.base;
    }

    /// Wait the next reconnect would use
    pub fn current(&self) -> Duration {
        self.wait
    }
}
