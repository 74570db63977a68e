//! Core order book implementation
//!
//! Holds both sides of the subscribed product plus the latest ticker, and
//! rolls raw levels up into precision buckets for the depth ladder.

use rust_decimal::Decimal;

use super::precision::{precision_unit, round_to_bucket};
use super::{AggregatedLevel, PriceLevelSet, Side};
use crate::parser::{LevelChange, PriceLevel, Ticker};

/// Order book for a single subscribed product
#[derive(Debug, Clone)]
pub struct OrderBook {
    product_id: String,
    /// Bids sorted by price descending (highest first)
    bids: PriceLevelSet,
    /// Asks sorted by price ascending (lowest first)
    asks: PriceLevelSet,
    last_ticker: Option<Ticker>,
    /// Whether a snapshot has been applied
    initialized: bool,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(product_id: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            bids: PriceLevelSet::new(Side::Bid),
            asks: PriceLevelSet::new(Side::Ask),
            last_ticker: None,
            initialized: false,
        }
    }

    /// Replace both sides with the snapshot levels.
    ///
    /// A second snapshot is a full reset, not a merge.
    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids = PriceLevelSet::from_levels(Side::Bid, bids);
        self.asks = PriceLevelSet::from_levels(Side::Ask, asks);
        self.initialized = true;
    }

    /// Apply l2update changes in order; later changes to a price win.
    ///
    /// Returns false when no snapshot has been applied yet and the diff was
    /// dropped.
    pub fn apply_diff(&mut self, changes: &[LevelChange]) -> bool {
        if !self.initialized {
            return false;
        }

        for change in changes {
            let side = match change.side {
                Some(Side::Bid) => &mut self.bids,
                Some(Side::Ask) => &mut self.asks,
                None => continue,
            };

            if change.size.is_zero() {
                side.remove(&change.price);
            } else {
                side.insert(change.price, change.size);
            }
        }

        true
    }

    /// Replace the latest ticker
    pub fn apply_ticker(&mut self, ticker: Ticker) {
        self.last_ticker = Some(ticker);
    }

    /// Roll the side up into exactly `count` buckets at `precision` digits.
    ///
    /// Buckets are opened in best-price-first order. Once `count` buckets are
    /// open, levels still rounding into the last bucket keep accumulating and
    /// the walk stops at the first level that would open another one. A
    /// shortfall is padded with zero-size buckets stepping one precision unit
    /// away from the last bucket. An empty side yields no buckets at all.
    /// Bid padding is not floored, so a ladder near zero continues into
    /// negative bucket prices.
    pub fn top_levels(&self, side: Side, count: usize, precision: u32) -> Vec<AggregatedLevel> {
        let levels = self.side(side);
        if levels.is_empty() || count == 0 {
            return Vec::new();
        }

        let mut buckets: Vec<AggregatedLevel> = Vec::with_capacity(count);
        for (price, size) in levels.iter_from_top(usize::MAX) {
            let bucket = round_to_bucket(*price, precision);
            if let Some(last) = buckets.last_mut() {
                if last.price == bucket {
                    last.size += *size;
                    continue;
                }
            }
            if buckets.len() == count {
                break;
            }
            buckets.push(AggregatedLevel {
                price: bucket,
                size: *size,
            });
        }

        let step = precision_unit(precision);
        while buckets.len() < count {
            let Some(last) = buckets.last() else { break };
            let price = match side {
                Side::Bid => last.price - step,
                Side::Ask => last.price + step,
            };
            buckets.push(AggregatedLevel {
                price,
                size: Decimal::ZERO,
            });
        }

        buckets
    }

    fn side(&self, side: Side) -> &PriceLevelSet {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Levels of one side
    pub fn levels(&self, side: Side) -> &PriceLevelSet {
        self.side(side)
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best()
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best()
    }

    pub fn last_ticker(&self) -> Option<&Ticker> {
        self.last_ticker.as_ref()
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Check if the book is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
