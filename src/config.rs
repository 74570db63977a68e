//! Configuration module for the depth feed

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MarketDataError, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the upstream market-data feed
    pub ws_endpoint: String,

    /// Market to subscribe at start-up (e.g. "BTC-ETH")
    pub market: Option<String>,

    /// Number of aggregated levels published per side
    pub depth_levels: usize,

    /// Interval between published depth snapshots
    pub sample_interval_ms: u64,

    /// Reconnection settings
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,

    /// Lower bound for the bucket precision derived from the ticker price
    pub min_precision: u32,

    /// Send a keepalive ping after this long without inbound frames
    pub idle_timeout_secs: u64,

    /// Unix socket of the chart consumer; messages are only logged when unset
    pub ipc_socket_path: Option<String>,

    /// Port for health, metrics and market control
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            market: env::var("MARKET")
                .ok()
                .map(|m| m.trim().to_uppercase())
                .filter(|m| !m.is_empty()),
            depth_levels: parse_or("DEPTH_LEVELS", defaults.depth_levels),
            sample_interval_ms: parse_or("SAMPLE_INTERVAL_MS", defaults.sample_interval_ms),
            reconnect_base_ms: parse_or("RECONNECT_BASE_MS", defaults.reconnect_base_ms),
            reconnect_max_ms: parse_or("RECONNECT_MAX_MS", defaults.reconnect_max_ms),
            min_precision: parse_or("MIN_PRECISION", defaults.min_precision),
            idle_timeout_secs: parse_or("IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            ipc_socket_path: env::var("IPC_SOCKET_PATH").ok().filter(|p| !p.is_empty()),
            http_port: parse_or("HTTP_PORT", defaults.http_port),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the feed cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_base_ms == 0 {
            return Err(MarketDataError::ConfigError(
                "RECONNECT_BASE_MS must be positive".to_string(),
            ));
        }
        if self.reconnect_max_ms < self.reconnect_base_ms {
            return Err(MarketDataError::ConfigError(format!(
                "RECONNECT_MAX_MS ({}) is below RECONNECT_BASE_MS ({})",
                self.reconnect_max_ms, self.reconnect_base_ms
            )));
        }
        if self.sample_interval_ms == 0 {
            return Err(MarketDataError::ConfigError(
                "SAMPLE_INTERVAL_MS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://ws-feed.pro.coinbase.com".to_string(),
            market: None,
            depth_levels: 20,
            sample_interval_ms: 1000,
            reconnect_base_ms: 500,
            reconnect_max_ms: 16_000,
            min_precision: 3,
            idle_timeout_secs: 30,
            ipc_socket_path: None,
            http_port: 9090,
        }
    }
}
