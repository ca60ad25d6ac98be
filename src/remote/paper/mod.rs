//! Paper exchange
//!
//! In-process exchange simulation implementing [`RemoteExchangeApi`].
//! Orders that cross seeded liquidity execute immediately without an id;
//! everything else rests until [`PaperExchange::fill`] or a cancel. Faults
//! can be injected per market or per order.

mod book;

pub use book::{Ladder, Side};

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    NewOrder, OrderbookRows, PlaceOrderAck, RemoteError, RemoteExchangeApi, RemoteOrder,
    RemoteStatus, StatusQuery,
};
use crate::orderbook::MarketOrder;
use crate::orders::{OrderId, OrderType};
use crate::symbol::normalize_symbol;

pub const STATUS_NEW: &str = "NEW";
pub const STATUS_PARTIALLY_FILLED: &str = "PARTIALLY_FILLED";
pub const STATUS_FILLED: &str = "FILLED";
pub const STATUS_CANCELED: &str = "CANCELED";
pub const STATUS_EXPIRED: &str = "EXPIRED";

/// Levels per side returned by `fetch_orderbook`
const BOOK_DEPTH: usize = 20;

#[derive(Debug, Clone)]
struct PaperOrder {
    id: OrderId,
    market: String,
    order_type: OrderType,
    price: Decimal,
    amount: Decimal,
    filled: Decimal,
    fee: Decimal,
    status_code: String,
    opened_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaperOrder {
    fn is_resting(&self) -> bool {
        self.status_code == STATUS_NEW || self.status_code == STATUS_PARTIALLY_FILLED
    }

    fn to_remote(&self) -> RemoteOrder {
        RemoteOrder {
            order_id: self.id,
            status_code: self.status_code.clone(),
            filled_amount: self.filled,
            fee: self.fee,
            opened_at: Some(self.opened_at),
            updated_at: Some(self.updated_at),
        }
    }
}

#[derive(Debug, Default)]
struct PaperState {
    next_id: i64,
    orders: HashMap<OrderId, PaperOrder>,
    /// Seeded external liquidity per market
    books: HashMap<String, Ladder>,
    balances: HashMap<String, Decimal>,
    failing_markets: HashSet<String>,
    failing_cancels: HashSet<OrderId>,
}

/// Simulated exchange
#[derive(Debug)]
pub struct PaperExchange {
    state: Mutex<PaperState>,
    fee_rate: Decimal,
    market_queries: bool,
}

impl PaperExchange {
    pub fn new(fee_rate: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                next_id: 1,
                ..Default::default()
            }),
            fee_rate,
            market_queries: true,
        }
    }

    /// Only answer per-order status queries, like exchanges without a
    /// "my open orders by market" endpoint.
    pub fn without_market_queries(mut self) -> Self {
        self.market_queries = false;
        self
    }

    /// Replace the external liquidity of a market.
    pub async fn seed_book(&self, symbol: &str, bids: Vec<MarketOrder>, asks: Vec<MarketOrder>) {
        let mut state = self.state.lock().await;
        let symbol = normalize_symbol(symbol);
        info!(symbol = %symbol, bids = bids.len(), asks = asks.len(), "Paper book seeded");
        state.books.insert(symbol, Ladder::from_levels(&bids, &asks));
    }

    pub async fn set_balance(&self, currency: &str, amount: Decimal) {
        let mut state = self.state.lock().await;
        state.balances.insert(currency.to_uppercase(), amount);
    }

    /// Execute `amount` more of a resting order.
    pub async fn fill(&self, order_id: OrderId, amount: Decimal) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RemoteError::Rejected(format!("Unknown order {}", order_id)))?;

        if !order.is_resting() {
            return Err(RemoteError::Rejected(format!("Order {} is closed", order_id)));
        }

        order.filled = (order.filled + amount).min(order.amount);
        order.fee = order.filled * order.price * self.fee_rate;
        order.status_code = if order.filled >= order.amount {
            STATUS_FILLED.to_string()
        } else {
            STATUS_PARTIALLY_FILLED.to_string()
        };
        order.updated_at = Utc::now();

        debug!(order_id = %order_id, filled = %order.filled, status = %order.status_code, "Paper fill");
        Ok(())
    }

    /// Force a raw status code, e.g. to emulate exchange-side expiry.
    pub async fn set_status_code(&self, order_id: OrderId, code: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RemoteError::Rejected(format!("Unknown order {}", order_id)))?;
        order.status_code = code.to_string();
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Make every request touching `symbol` fail with a network error.
    pub async fn set_market_failing(&self, symbol: &str, failing: bool) {
        let mut state = self.state.lock().await;
        let symbol = normalize_symbol(symbol);
        if failing {
            state.failing_markets.insert(symbol);
        } else {
            state.failing_markets.remove(&symbol);
        }
    }

    /// Make cancellation of `order_id` fail.
    pub async fn set_cancel_failing(&self, order_id: OrderId) {
        let mut state = self.state.lock().await;
        state.failing_cancels.insert(order_id);
    }

    fn check_market(state: &PaperState, symbol: &str) -> Result<(), RemoteError> {
        if state.failing_markets.contains(symbol) {
            return Err(RemoteError::Network(format!("Connection reset for {}", symbol)));
        }
        if !state.books.contains_key(symbol) {
            return Err(RemoteError::Rejected(format!("Unknown market {}", symbol)));
        }
        Ok(())
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new(Decimal::new(1, 3)) // 0.1%
    }
}

#[async_trait]
impl RemoteExchangeApi for PaperExchange {
    async fn place_order(&self, order: &NewOrder) -> Result<PlaceOrderAck, RemoteError> {
        let mut state = self.state.lock().await;
        let symbol = normalize_symbol(&order.symbol);
        Self::check_market(&state, &symbol)?;

        let side = match order.order_type {
            OrderType::Buy => Side::Ask,
            OrderType::Sell => Side::Bid,
        };
        let executed = state
            .books
            .get_mut(&symbol)
            .and_then(|ladder| ladder.take_best(side, order.price, order.amount));

        if let Some(price) = executed {
            let fee = order.amount * price * self.fee_rate;
            info!(symbol = %symbol, price = %price, amount = %order.amount, "Paper order executed immediately");
            return Ok(PlaceOrderAck {
                order_id: None,
                accepted: true,
                fee,
            });
        }

        let id = OrderId::new(state.next_id);
        state.next_id += 1;
        let now = Utc::now();
        state.orders.insert(
            id,
            PaperOrder {
                id,
                market: symbol,
                order_type: order.order_type,
                price: order.price,
                amount: order.amount,
                filled: Decimal::ZERO,
                fee: Decimal::ZERO,
                status_code: STATUS_NEW.to_string(),
                opened_at: now,
                updated_at: now,
            },
        );

        Ok(PlaceOrderAck {
            order_id: Some(id),
            accepted: true,
            fee: Decimal::ZERO,
        })
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        if state.failing_cancels.contains(&order_id) {
            return Err(RemoteError::Rejected(format!("Cancel refused for {}", order_id)));
        }

        let order = state
            .orders
            .get(&order_id)
            .ok_or_else(|| RemoteError::Rejected(format!("Unknown order {}", order_id)))?;
        Self::check_market(&state, &order.market)?;

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RemoteError::Rejected(format!("Unknown order {}", order_id)))?;
        if !order.is_resting() {
            return Err(RemoteError::Rejected(format!("Order {} is closed", order_id)));
        }
        order.status_code = STATUS_CANCELED.to_string();
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn fetch_order_status(
        &self,
        query: &StatusQuery,
    ) -> Result<Vec<RemoteOrder>, RemoteError> {
        let state = self.state.lock().await;
        let market = normalize_symbol(query.market());
        Self::check_market(&state, &market)?;

        match query {
            StatusQuery::Market(_) => {
                if !self.market_queries {
                    return Err(RemoteError::Unsupported("status by market".to_string()));
                }
                let mut orders: Vec<RemoteOrder> = state
                    .orders
                    .values()
                    .filter(|o| o.market == market)
                    .map(PaperOrder::to_remote)
                    .collect();
                orders.sort_by_key(|o| o.order_id);
                Ok(orders)
            }
            StatusQuery::Order { order_id, .. } => Ok(state
                .orders
                .get(order_id)
                .map(|o| vec![o.to_remote()])
                .unwrap_or_default()),
        }
    }

    async fn fetch_orderbook(&self, symbol: &str) -> Result<OrderbookRows, RemoteError> {
        let state = self.state.lock().await;
        let symbol = normalize_symbol(symbol);
        Self::check_market(&state, &symbol)?;

        let mut ladder = state.books.get(&symbol).cloned().unwrap_or_default();
        for order in state.orders.values() {
            if order.market == symbol && order.is_resting() {
                let side = match order.order_type {
                    OrderType::Buy => Side::Bid,
                    OrderType::Sell => Side::Ask,
                };
                ladder.add(side, order.price, order.amount - order.filled);
            }
        }

        let (bids, asks) = ladder.rows(BOOK_DEPTH);
        Ok(OrderbookRows { bids, asks })
    }

    async fn fetch_balance(&self, currency: &str) -> Result<Decimal, RemoteError> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .get(&currency.to_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    fn supports_market_query(&self) -> bool {
        self.market_queries
    }

    fn classify_status(&self, code: &str) -> RemoteStatus {
        match code {
            STATUS_NEW => RemoteStatus::Resting,
            STATUS_PARTIALLY_FILLED => RemoteStatus::PartiallyFilled,
            STATUS_FILLED => RemoteStatus::Filled,
            STATUS_CANCELED | STATUS_EXPIRED => RemoteStatus::Cancelled,
            _ => RemoteStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn exchange() -> PaperExchange {
        let ex = PaperExchange::new(dec!(0.001));
        ex.seed_book(
            "BTC/USDT",
            vec![MarketOrder::new(dec!(99), dec!(1))],
            vec![MarketOrder::new(dec!(101), dec!(1))],
        )
        .await;
        ex
    }

    fn buy(price: Decimal, amount: Decimal) -> NewOrder {
        NewOrder {
            symbol: "BTC/USDT".to_string(),
            order_type: OrderType::Buy,
            price,
            amount,
        }
    }

    #[tokio::test]
    async fn test_resting_order_gets_id_and_shows_in_book() {
        let ex = exchange().await;
        let ack = ex.place_order(&buy(dec!(100), dec!(2))).await.unwrap();
        assert_eq!(ack.order_id, Some(OrderId::new(1)));

        let rows = ex.fetch_orderbook("btc_usdt").await.unwrap();
        assert_eq!(rows.bids[0], MarketOrder::new(dec!(100), dec!(2)));
        assert_eq!(rows.asks[0].price, dec!(101));
    }

    #[tokio::test]
    async fn test_crossing_order_executes_without_id() {
        let ex = exchange().await;
        let ack = ex.place_order(&buy(dec!(102), dec!(1))).await.unwrap();
        assert_eq!(ack.order_id, None);
        assert_eq!(ack.fee, dec!(0.101));

        let rows = ex.fetch_orderbook("BTC/USDT").await.unwrap();
        assert!(rows.asks.is_empty());
    }

    #[tokio::test]
    async fn test_fill_and_cancel_status_codes() {
        let ex = exchange().await;
        let id = ex
            .place_order(&buy(dec!(100), dec!(2)))
            .await
            .unwrap()
            .order_id
            .unwrap();

        ex.fill(id, dec!(1)).await.unwrap();
        let orders = ex
            .fetch_order_status(&StatusQuery::Market("BTC/USDT".into()))
            .await
            .unwrap();
        assert_eq!(orders[0].status_code, STATUS_PARTIALLY_FILLED);
        assert_eq!(orders[0].filled_amount, dec!(1));

        ex.cancel_order(id).await.unwrap();
        assert!(ex.cancel_order(id).await.is_err());
        let orders = ex
            .fetch_order_status(&StatusQuery::Order {
                order_id: id,
                market: "BTC/USDT".into(),
            })
            .await
            .unwrap();
        assert_eq!(ex.classify_status(&orders[0].status_code), RemoteStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let ex = exchange().await;
        ex.set_market_failing("BTC/USDT", true).await;
        assert!(matches!(
            ex.fetch_orderbook("BTC/USDT").await,
            Err(RemoteError::Network(_))
        ));
        ex.set_market_failing("BTC/USDT", false).await;
        assert!(ex.fetch_orderbook("BTC/USDT").await.is_ok());

        assert!(matches!(
            ex.place_order(&NewOrder {
                symbol: "XRP/EUR".into(),
                ..buy(dec!(1), dec!(1))
            })
            .await,
            Err(RemoteError::Rejected(_))
        ));
    }

    #[test]
    fn test_classify_unknown_code() {
        let ex = PaperExchange::default();
        assert_eq!(ex.classify_status("PENDING_NEW"), RemoteStatus::Unknown);
        assert_eq!(ex.classify_status(STATUS_FILLED), RemoteStatus::Filled);
    }
}
