//! Orderbook metrics calculation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{MarketOrder, MarketRecord};

/// Levels per side used for the imbalance figure
const IMBALANCE_LEVELS: usize = 5;

/// Computed metrics for a cached snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetrics {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,

    /// Mid price (average of best bid and ask)
    pub mid_price: Option<Decimal>,

    /// Spread in basis points
    pub spread_bps: Option<Decimal>,

    /// Simple imbalance: (bid_vol - ask_vol) / (bid_vol + ask_vol) over the top levels
    pub imbalance: Option<Decimal>,

    /// Total bid volume
    pub bid_depth: Decimal,

    /// Total ask volume
    pub ask_depth: Decimal,

    pub bid_levels: usize,
    pub ask_levels: usize,
}

impl BookMetrics {
    pub fn from_record(record: &MarketRecord) -> Self {
        let best_bid = record.best_bid().map(|l| l.price);
        let best_ask = record.best_ask().map(|l| l.price);

        let mid_price = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        };

        let spread_bps = match (best_bid, best_ask, mid_price) {
            (Some(bid), Some(ask), Some(mid)) if mid > Decimal::ZERO => {
                Some((ask - bid) / mid * Decimal::from(10000))
            }
            _ => None,
        };

        let top_bid = volume(record.bids.iter().take(IMBALANCE_LEVELS));
        let top_ask = volume(record.asks.iter().take(IMBALANCE_LEVELS));
        let total = top_bid + top_ask;
        let imbalance = if total > Decimal::ZERO {
            Some((top_bid - top_ask) / total)
        } else {
            None
        };

        Self {
            best_bid,
            best_ask,
            mid_price,
            spread_bps,
            imbalance,
            bid_depth: volume(record.bids.iter()),
            ask_depth: volume(record.asks.iter()),
            bid_levels: record.bids.len(),
            ask_levels: record.asks.len(),
        }
    }

    /// Both sides present and not crossed
    pub fn is_healthy(&self) -> bool {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => bid < ask,
            _ => false,
        }
    }
}

fn volume<'a>(levels: impl Iterator<Item = &'a MarketOrder>) -> Decimal {
    levels.map(|l| l.volume).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record() -> MarketRecord {
        MarketRecord {
            symbol: "BTC/USDT".to_string(),
            timestamp: Utc::now(),
            bids: vec![
                MarketOrder::new(dec!(50000), dec!(1.0)),
                MarketOrder::new(dec!(49999), dec!(2.0)),
            ],
            asks: vec![
                MarketOrder::new(dec!(50001), dec!(1.5)),
                MarketOrder::new(dec!(50002), dec!(2.5)),
            ],
        }
    }

    #[test]
    fn test_mid_and_spread() {
        let m = record().metrics();
        assert_eq!(m.best_bid, Some(dec!(50000)));
        assert_eq!(m.best_ask, Some(dec!(50001)));
        assert_eq!(m.mid_price, Some(dec!(50000.5)));
        assert!(m.spread_bps.unwrap() > Decimal::ZERO);
        assert!(m.is_healthy());
    }

    #[test]
    fn test_imbalance_and_depth() {
        let m = record().metrics();
        // Bids 3.0 vs asks 4.0
        assert_eq!(m.imbalance, Some(dec!(-1) / dec!(7)));
        assert_eq!(m.bid_depth, dec!(3.0));
        assert_eq!(m.ask_depth, dec!(4.0));
        assert_eq!(m.bid_levels, 2);
    }

    #[test]
    fn test_one_sided_book() {
        let mut r = record();
        r.asks.clear();
        let m = r.metrics();
        assert_eq!(m.mid_price, None);
        assert_eq!(m.spread_bps, None);
        assert!(!m.is_healthy());
    }
}
