//! Parser module for upstream feed frames
//!
//! Inbound frames carry a `type` discriminator; only `snapshot`, `l2update`
//! and `ticker` are routed to the order book. Outbound control frames are
//! built here as well.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::orderbook::Side;

/// Channels requested with every subscription
pub const CHANNELS: [&str; 2] = ["level2", "ticker"];

/// Full book snapshot for one product
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub product_id: String,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Incremental level-2 update
#[derive(Debug, Clone, Deserialize)]
pub struct L2Update {
    pub product_id: String,

    #[serde(default)]
    pub time: Option<String>,

    #[serde(deserialize_with = "deserialize_changes")]
    pub changes: Vec<LevelChange>,
}

/// Latest trade/quote summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub product_id: String,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub high_24h: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub low_24h: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub open_24h: Decimal,
}

/// Error frame sent by the feed (bad subscription, rate limit, ...)
#[derive(Debug, Clone, Deserialize)]
pub struct FeedError {
    pub message: String,

    #[serde(default)]
    pub reason: Option<String>,
}

/// Price level (price, size pair)
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// One entry of an l2update `changes` array.
///
/// `side` is `None` when the feed sent something other than `buy`/`sell`.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelChange {
    pub side: Option<Side>,
    pub price: Decimal,
    pub size: Decimal,
}

/// Parsed upstream frame
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Snapshot(Snapshot),
    Update(L2Update),
    Ticker(Ticker),
    Error(FeedError),
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

impl FeedMessage {
    /// Parse a raw WebSocket text frame
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(raw)?;

        match envelope.kind.as_str() {
            "snapshot" => Ok(FeedMessage::Snapshot(serde_json::from_str(raw)?)),
            "l2update" | "update" => Ok(FeedMessage::Update(serde_json::from_str(raw)?)),
            "ticker" => Ok(FeedMessage::Ticker(serde_json::from_str(raw)?)),
            "error" => Ok(FeedMessage::Error(serde_json::from_str(raw)?)),
            _ => Ok(FeedMessage::Unknown(envelope.kind)),
        }
    }

    /// Product the frame belongs to, if it carries one
    pub fn product_id(&self) -> Option<&str> {
        match self {
            FeedMessage::Snapshot(s) => Some(&s.product_id),
            FeedMessage::Update(u) => Some(&u.product_id),
            FeedMessage::Ticker(t) => Some(&t.product_id),
            FeedMessage::Error(_) | FeedMessage::Unknown(_) => None,
        }
    }

    /// Label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            FeedMessage::Snapshot(_) => "snapshot",
            FeedMessage::Update(_) => "l2update",
            FeedMessage::Ticker(_) => "ticker",
            FeedMessage::Error(_) => "error",
            FeedMessage::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Subscribe,
    Unsubscribe,
}

/// Outbound subscribe/unsubscribe frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlFrame {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub product_ids: Vec<String>,
    pub channels: Vec<String>,
}

impl ControlFrame {
    pub fn subscribe(product_id: &str) -> Self {
        Self::new(ControlKind::Subscribe, vec![product_id.to_string()])
    }

    pub fn unsubscribe(product_ids: Vec<String>) -> Self {
        Self::new(ControlKind::Unsubscribe, product_ids)
    }

    fn new(kind: ControlKind, product_ids: Vec<String>) -> Self {
        Self {
            kind,
            product_ids,
            channels: CHANNELS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Custom deserializer for Decimal from string
fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(&s).map_err(serde::de::Error::custom)
}

/// Custom deserializer for price levels from array of string pairs
fn deserialize_price_levels<'de, D>(deserializer: D) -> Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() < 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(PriceLevel {
                price: Decimal::from_str(&pair[0]).map_err(serde::de::Error::custom)?,
                size: Decimal::from_str(&pair[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

/// Custom deserializer for `[side, price, size]` triples
fn deserialize_changes<'de, D>(deserializer: D) -> Result<Vec<LevelChange>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|change| {
            if change.len() != 3 {
                return Err(serde::de::Error::custom("Invalid level change format"));
            }
            Ok(LevelChange {
                side: Side::from_feed(&change[0]),
                price: Decimal::from_str(&change[1]).map_err(serde::de::Error::custom)?,
                size: Decimal::from_str(&change[2]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_snapshot() {
        let raw = r#"{
            "type": "snapshot",
            "product_id": "ETH-BTC",
            "bids": [["0.000415", "19530.3"], ["0.00040", "5495.19999999"]],
            "asks": [["0.00042108", "500.00"]]
        }"#;

        let msg = FeedMessage::parse(raw).unwrap();
        if let FeedMessage::Snapshot(snapshot) = msg {
            assert_eq!(snapshot.product_id, "ETH-BTC");
            assert_eq!(snapshot.bids.len(), 2);
            assert_eq!(snapshot.asks.len(), 1);
            assert_eq!(snapshot.bids[1].size, dec!(5495.19999999));
        } else {
            panic!("Expected Snapshot");
        }
    }

    #[test]
    fn test_parse_l2update() {
        let raw = r#"{
            "type": "l2update",
            "product_id": "ETH-BTC",
            "time": "2021-01-01T00:00:00.000000Z",
            "changes": [["buy", "0.00041600", "0.00000000"], ["sell", "0.00041600", "100.4"], ["hold", "1", "1"]]
        }"#;

        let msg = FeedMessage::parse(raw).unwrap();
        if let FeedMessage::Update(update) = msg {
            assert_eq!(update.changes.len(), 3);
            assert_eq!(update.changes[0].side, Some(Side::Bid));
            assert!(update.changes[0].size.is_zero());
            assert_eq!(update.changes[1].side, Some(Side::Ask));
            assert_eq!(update.changes[2].side, None);
        } else {
            panic!("Expected Update");
        }
    }

    #[test]
    fn test_parse_ticker() {
        let raw = r#"{
            "type": "ticker",
            "product_id": "ETH-BTC",
            "price": "0.00042",
            "high_24h": "0.00045",
            "low_24h": "0.00040",
            "open_24h": "0.00041",
            "volume_24h": "1234.5",
            "sequence": 42
        }"#;

        let msg = FeedMessage::parse(raw).unwrap();
        if let FeedMessage::Ticker(ticker) = msg {
            assert_eq!(ticker.price, dec!(0.00042));
            assert_eq!(ticker.low_24h.to_string(), "0.00040");
        } else {
            panic!("Expected Ticker");
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let msg = FeedMessage::parse(r#"{"type":"heartbeat","sequence":1}"#).unwrap();
        assert!(matches!(msg, FeedMessage::Unknown(kind) if kind == "heartbeat"));
    }

    #[test]
    fn test_malformed_price_rejected() {
        let raw = r#"{"type":"l2update","product_id":"ETH-BTC","changes":[["buy","abc","1"]]}"#;
        assert!(FeedMessage::parse(raw).is_err());
    }

    #[test]
    fn test_control_frame_shape() {
        let json = ControlFrame::subscribe("ETH-BTC").to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"subscribe","product_ids":["ETH-BTC"],"channels":["level2","ticker"]}"#
        );

        let frame = ControlFrame::unsubscribe(vec!["ETH-BTC".to_string()]);
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "unsubscribe");
    }
}
