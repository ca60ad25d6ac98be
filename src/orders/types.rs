//! Order types and the order status state machine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange-assigned order identifier.
///
/// Real exchange ids are strictly positive. Negative ids are reserved for
/// orders the exchange executed instantly without assigning an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// True for ids taken from the reserved synthetic range.
    pub const fn is_synthetic(self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Buy => write!(f, "buy"),
            OrderType::Sell => write!(f, "sell"),
        }
    }
}

/// Order lifecycle status.
///
/// ```text
/// Submitted -> Opened -> {Partial <-> Opened} -> Completed
/// Submitted | Opened | Partial -> Cancelled
/// ```
///
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Sent to the exchange, not yet acknowledged
    Submitted,
    /// Resting on the book, unfilled
    Opened,
    /// Partially filled, still resting
    Partial,
    /// Fully filled
    Completed,
    /// Cancelled by the user or the exchange
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses an order may be first registered with.
    ///
    /// Terminal statuses are accepted for orders the exchange reports as
    /// already finished.
    pub fn is_valid_initial(&self) -> bool {
        !matches!(self, Self::Partial)
    }

    /// Whether moving from `self` to `next` is legal.
    ///
    /// A poll may miss intermediate states, so `Submitted` may jump straight
    /// to `Partial` or `Completed`. Open statuses may be re-applied (fill
    /// and fee refreshes); nothing leaves a terminal status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, next) {
            (Completed | Cancelled, _) => false,
            (Submitted, Submitted) => true,
            (Submitted, Opened | Partial | Completed | Cancelled) => true,
            (Opened | Partial, Opened | Partial | Completed | Cancelled) => true,
            (Opened | Partial, Submitted) => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Opened => write!(f, "opened"),
            Self::Partial => write!(f, "partial"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One trading request and its evolving execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    /// Canonical market symbol (e.g. "BTC/USDT")
    pub market: String,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub submitted: DateTime<Utc>,

    pub status: OrderStatus,
    /// When the exchange acknowledged the order
    pub accepted: Option<DateTime<Utc>>,
    pub completed_amount: Decimal,
    pub fee: Decimal,
    /// Set only once the order reaches a terminal status
    pub completed: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a freshly submitted order.
    pub fn new(
        order_id: OrderId,
        market: impl Into<String>,
        order_type: OrderType,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            order_id,
            market: market.into(),
            order_type,
            price,
            amount,
            submitted: Utc::now(),
            status: OrderStatus::Submitted,
            accepted: None,
            completed_amount: Decimal::ZERO,
            fee: Decimal::ZERO,
            completed: None,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether any quantity of this order has executed.
    pub fn has_executions(&self) -> bool {
        self.completed_amount > Decimal::ZERO
    }
}
