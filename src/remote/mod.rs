//! Remote exchange abstraction
//!
//! Everything exchange-specific (request signing, endpoints, response
//! parsing, status codes) lives behind [`RemoteExchangeApi`]. The facade and
//! the reconciler are written once against this trait.

pub mod paper;

pub use paper::PaperExchange;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::orderbook::MarketOrder;
use crate::orders::{OrderId, OrderType};

/// Errors reported by a remote exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rejected by exchange: {0}")]
    Rejected(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Unexpected exchange response: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Errors worth retrying on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

/// A new limit order to place on the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    /// Canonical market symbol
    pub symbol: String,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
}

/// Exchange acknowledgment of a placed order
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrderAck {
    /// Exchange-assigned id, `None` when the order executed immediately
    pub order_id: Option<OrderId>,
    /// The exchange reports the order as already resting on the book
    pub accepted: bool,
    /// Fee charged so far
    pub fee: Decimal,
}

/// Scope of an order status request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusQuery {
    /// All of our orders in one market
    Market(String),
    /// A single order
    Order { order_id: OrderId, market: String },
}

impl StatusQuery {
    pub fn market(&self) -> &str {
        match self {
            Self::Market(market) => market,
            Self::Order { market, .. } => market,
        }
    }
}

/// Order state as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOrder {
    pub order_id: OrderId,
    /// Exchange-specific status code, see [`RemoteExchangeApi::classify_status`]
    pub status_code: String,
    pub filled_amount: Decimal,
    pub fee: Decimal,
    pub opened_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Exchange-agnostic meaning of a remote status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Still resting, unfilled
    Resting,
    PartiallyFilled,
    Filled,
    /// Cancelled by the exchange or the user
    Cancelled,
    /// Code not recognized, never mapped to a guessed status
    Unknown,
}

/// Raw orderbook rows for one market, best levels first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderbookRows {
    pub bids: Vec<MarketOrder>,
    pub asks: Vec<MarketOrder>,
}

/// REST surface of one exchange
#[async_trait]
pub trait RemoteExchangeApi: Send + Sync {
    async fn place_order(&self, order: &NewOrder) -> Result<PlaceOrderAck, RemoteError>;

    async fn cancel_order(&self, order_id: OrderId) -> Result<(), RemoteError>;

    async fn fetch_order_status(&self, query: &StatusQuery)
        -> Result<Vec<RemoteOrder>, RemoteError>;

    async fn fetch_orderbook(&self, symbol: &str) -> Result<OrderbookRows, RemoteError>;

    async fn fetch_balance(&self, currency: &str) -> Result<Decimal, RemoteError>;

    /// Whether `StatusQuery::Market` is supported. When it is not, the
    /// reconciler queries open orders one by one.
    fn supports_market_query(&self) -> bool {
        true
    }

    /// Map an exchange-specific status code to its meaning.
    fn classify_status(&self, code: &str) -> RemoteStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::Timeout.is_transient());
        assert!(!RemoteError::Rejected("insufficient funds".into()).is_transient());
        assert!(!RemoteError::Auth("bad key".into()).is_transient());
    }

    #[test]
    fn test_status_query_market() {
        let q = StatusQuery::Order {
            order_id: OrderId::new(3),
            market: "BTC/USDT".into(),
        };
        assert_eq!(q.market(), "BTC/USDT");
        assert_eq!(StatusQuery::Market("ETH/BTC".into()).market(), "ETH/BTC");
    }

    #[test]
    fn test_trait_is_object_safe() {
        fn _assert_object_safe(_api: &dyn RemoteExchangeApi) {}
    }
}
