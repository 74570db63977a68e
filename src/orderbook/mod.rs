//! Order book module
//!
//! Maintains the book of the subscribed market from snapshot and l2update
//! frames and rolls price levels up into a fixed-size depth ladder.

mod book;
mod level_set;
pub mod precision;

pub use book::OrderBook;
pub use level_set::PriceLevelSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Map the feed's `buy`/`sell` discriminator onto a book side
    pub fn from_feed(side: &str) -> Option<Side> {
        match side {
            "buy" => Some(Side::Bid),
            "sell" => Some(Side::Ask),
            _ => None,
        }
    }
}

/// A price bucket of the depth ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedLevel {
    /// Bucket price, carrying exactly `precision` fractional digits
    #[serde(rename = "bucketPrice")]
    pub price: Decimal,
    /// Sum of the raw sizes rounding into this bucket
    #[serde(rename = "aggregatedSize")]
    pub size: Decimal,
}
