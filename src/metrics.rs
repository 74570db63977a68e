//! Prometheus metrics for the feed

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{MarketDataError, Result};

/// Feed counters, cheap to clone and share between tasks
#[derive(Clone)]
pub struct FeedMetrics {
    registry: Registry,
    frames: IntCounterVec,
    reconnects: IntCounter,
    connection_open: IntGauge,
    snapshots_published: IntCounter,
}

impl FeedMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let frames = IntCounterVec::new(
            Opts::new("feed_frames_total", "Inbound feed frames by type"),
            &["kind"],
        )?;
        let reconnects = IntCounter::new("feed_reconnects_total", "Scheduled reconnect attempts")?;
        let connection_open = IntGauge::new("feed_connection_open", "1 while the feed socket is open")?;
        let snapshots_published = IntCounter::new(
            "depth_snapshots_published_total",
            "Depth snapshots delivered to the consumer",
        )?;

        registry.register(Box::new(frames.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(connection_open.clone()))?;
        registry.register(Box::new(snapshots_published.clone()))?;

        Ok(Self {
            registry,
            frames,
            reconnects,
            connection_open,
            snapshots_published,
        })
    }

    pub fn frame(&self, kind: &str) {
        self.frames.with_label_values(&[kind]).inc();
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects.inc();
    }

    pub fn set_connection_open(&self, open: bool) {
        self.connection_open.set(i64::from(open));
    }

    pub fn snapshot_published(&self) {
        self.snapshots_published.inc();
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MarketDataError::SerializationError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MarketDataError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() {
        let metrics = FeedMetrics::new().unwrap();
        metrics.frame("snapshot");
        metrics.frame("l2update");
        metrics.frame("l2update");
        metrics.set_connection_open(true);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"feed_frames_total{kind="l2update"} 2"#));
        assert!(text.contains("feed_connection_open 1"));
    }
}
