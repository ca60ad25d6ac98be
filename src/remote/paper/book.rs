//! Price ladder for the paper exchange
//!
//! Uses BTreeMap for sorted price level management.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::orderbook::MarketOrder;

/// Side of the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

/// Aggregated volume per price level for one market
#[derive(Debug, Clone, Default)]
pub struct Ladder {
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
}

impl Ladder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from level rows; zero-volume rows are ignored.
    pub fn from_levels(bids: &[MarketOrder], asks: &[MarketOrder]) -> Self {
        let mut ladder = Self::new();
        for level in bids {
            ladder.add(Side::Bid, level.price, level.volume);
        }
        for level in asks {
            ladder.add(Side::Ask, level.price, level.volume);
        }
        ladder
    }

    /// Add volume at a price level
    pub fn add(&mut self, side: Side, price: Decimal, volume: Decimal) {
        if volume <= Decimal::ZERO {
            return;
        }
        match side {
            Side::Bid => *self.bids.entry(Reverse(price)).or_insert(Decimal::ZERO) += volume,
            Side::Ask => *self.asks.entry(price).or_insert(Decimal::ZERO) += volume,
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Take `volume` from the best level of `side` if that level is at or
    /// better than `limit` and holds enough volume.
    ///
    /// Returns the execution price.
    pub fn take_best(&mut self, side: Side, limit: Decimal, volume: Decimal) -> Option<Decimal> {
        match side {
            Side::Ask => {
                let mut entry = self.asks.first_entry()?;
                let price = *entry.key();
                if price > limit || *entry.get() < volume {
                    return None;
                }
                *entry.get_mut() -= volume;
                if entry.get().is_zero() {
                    entry.remove();
                }
                Some(price)
            }
            Side::Bid => {
                let mut entry = self.bids.first_entry()?;
                let Reverse(price) = *entry.key();
                if price < limit || *entry.get() < volume {
                    return None;
                }
                *entry.get_mut() -= volume;
                if entry.get().is_zero() {
                    entry.remove();
                }
                Some(price)
            }
        }
    }

    /// Best-first rows, at most `depth` per side
    pub fn rows(&self, depth: usize) -> (Vec<MarketOrder>, Vec<MarketOrder>) {
        let bids = self
            .bids
            .iter()
            .take(depth)
            .map(|(Reverse(p), v)| MarketOrder::new(*p, *v))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(p, v)| MarketOrder::new(*p, *v))
            .collect();
        (bids, asks)
    }
}
