//! Orderbook cache module
//!
//! Keeps the latest bid/ask snapshot per market, written by the reconciler
//! and read by the exchange facade.

mod backend;
mod cache;
mod metrics;

pub use backend::{KeyValueStore, MemoryStore, StorageError};
pub use cache::{CacheError, OrderbookCache};
pub use metrics::BookMetrics;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single resting price level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub price: Decimal,
    pub volume: Decimal,
}

impl MarketOrder {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// Latest known orderbook snapshot for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Canonical market symbol
    pub symbol: String,
    /// When the snapshot was written to the cache
    pub timestamp: DateTime<Utc>,
    /// Bids, best (highest) first
    pub bids: Vec<MarketOrder>,
    /// Asks, best (lowest) first
    pub asks: Vec<MarketOrder>,
}

impl MarketRecord {
    pub fn best_bid(&self) -> Option<&MarketOrder> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&MarketOrder> {
        self.asks.first()
    }

    pub fn metrics(&self) -> BookMetrics {
        BookMetrics::from_record(self)
    }
}
