//! Ordered price levels for one side of the book
//!
//! Uses BTreeMap keyed by exact decimal price; the side decides which end is
//! the top.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::Side;
use crate::parser::PriceLevel;

/// Unique price → size levels, iterated best price first
#[derive(Debug, Clone)]
pub struct PriceLevelSet {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl PriceLevelSet {
    /// Create an empty set for the given side
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Seed a set from snapshot levels.
    ///
    /// Zero sizes are stored as given; only diffs carry delete semantics.
    pub fn from_levels(side: Side, levels: &[PriceLevel]) -> Self {
        Self {
            side,
            levels: levels.iter().map(|l| (l.price, l.size)).collect(),
        }
    }

    /// Insert or overwrite a level; a zero size removes it instead
    pub fn insert(&mut self, price: Decimal, size: Decimal) {
        if size.is_zero() {
            self.remove(&price);
        } else {
            self.levels.insert(price, size);
        }
    }

    /// Remove a level, ignoring absent prices
    pub fn remove(&mut self, price: &Decimal) {
        self.levels.remove(price);
    }

    /// Up to `limit` levels, best price first
    pub fn iter_from_top(&self, limit: usize) -> impl Iterator<Item = (&Decimal, &Decimal)> + '_ {
        let iter: Box<dyn Iterator<Item = (&Decimal, &Decimal)> + '_> = match self.side {
            Side::Bid => Box::new(self.levels.iter().rev()),
            Side::Ask => Box::new(self.levels.iter()),
        };
        iter.take(limit)
    }

    /// Best price on this side
    pub fn best(&self) -> Option<Decimal> {
        self.iter_from_top(1).next().map(|(p, _)| *p)
    }

    pub fn get(&self, price: &Decimal) -> Option<&Decimal> {
        self.levels.get(price)
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
