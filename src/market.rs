//! Markets and their upstream product identifiers
//!
//! Locally a market is named `BASE-TARGET`; the feed quotes the same pair as
//! `TARGET-BASE`. Only pairs in [`PRODUCT_MAP`] can be subscribed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MarketDataError, Result};

/// Local market name to upstream product id
const PRODUCT_MAP: &[(&str, &str)] = &[("BTC-ETH", "ETH-BTC"), ("BTC-BCH", "BCH-BTC")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Btc,
    Eth,
    Bch,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
            Currency::Bch => "BCH",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "BTC" => Ok(Currency::Btc),
            "ETH" => Ok(Currency::Eth),
            "BCH" => Ok(Currency::Bch),
            other => Err(MarketDataError::UnknownMarket(format!(
                "unsupported currency {}",
                other
            ))),
        }
    }
}

/// A trading pair as chosen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    pub base: Currency,
    pub target: Currency,
}

impl Market {
    pub fn new(base: Currency, target: Currency) -> Self {
        Self { base, target }
    }

    /// Upstream product id for this market
    pub fn product_id(&self) -> Result<&'static str> {
        let name = self.to_string();
        PRODUCT_MAP
            .iter()
            .find(|(local, _)| *local == name)
            .map(|(_, product)| *product)
            .ok_or(MarketDataError::UnknownMarket(name))
    }

    /// Reverse lookup from an upstream product id
    pub fn from_product_id(product_id: &str) -> Result<Self> {
        let (local, _) = PRODUCT_MAP
            .iter()
            .find(|(_, product)| *product == product_id)
            .ok_or_else(|| MarketDataError::UnknownMarket(product_id.to_string()))?;
        local.parse()
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.target)
    }
}

impl FromStr for Market {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self> {
        let (base, target) = s
            .split_once('-')
            .ok_or_else(|| MarketDataError::UnknownMarket(s.to_string()))?;
        Ok(Self::new(base.parse()?, target.parse()?))
    }
}
