//! Typed request and response structs for the facade

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::orders::{Order, OrderId, OrderType};
use crate::remote::NewOrder;
use crate::symbol::normalize_symbol;

/// Limit order parameters for `buy` / `sell`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub price: Decimal,
    pub amount: Decimal,
}

impl OrderRequest {
    pub fn new(symbol: impl Into<String>, price: Decimal, amount: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            amount,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if normalize_symbol(&self.symbol).is_empty() {
            return Err(GatewayError::InvalidRequest("symbol is empty".to_string()));
        }
        if self.price <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        if self.amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    /// Validated remote order with the canonical symbol.
    pub(crate) fn to_new_order(&self, order_type: OrderType) -> Result<NewOrder> {
        self.validate()?;
        Ok(NewOrder {
            symbol: normalize_symbol(&self.symbol),
            order_type,
            price: self.price,
            amount: self.amount,
        })
    }
}

/// Result of a batch cancel.
///
/// Every order is attempted; `error` holds the first failure and `failed`
/// lists every order that could not be cancelled.
#[derive(Debug, Default)]
pub struct CancelOutcome {
    pub cancelled: Vec<Order>,
    pub failed: Vec<OrderId>,
    pub error: Option<GatewayError>,
}

impl CancelOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Collapse into the cancelled orders, or the first error.
    pub fn into_result(self) -> Result<Vec<Order>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validation() {
        assert!(OrderRequest::new("BTC/USDT", dec!(1), dec!(1)).validate().is_ok());

        for bad in [
            OrderRequest::new("  ", dec!(1), dec!(1)),
            OrderRequest::new("BTC/USDT", dec!(0), dec!(1)),
            OrderRequest::new("BTC/USDT", dec!(1), dec!(-2)),
        ] {
            assert!(matches!(bad.validate(), Err(GatewayError::InvalidRequest(_))));
        }
    }

    #[test]
    fn test_new_order_uses_canonical_symbol() {
        let order = OrderRequest::new("eth_usdt", dec!(10), dec!(0.5))
            .to_new_order(OrderType::Sell)
            .unwrap();
        assert_eq!(order.symbol, "ETH/USDT");
        assert_eq!(order.order_type, OrderType::Sell);
    }

    #[test]
    fn test_cancel_outcome_into_result() {
        let ok = CancelOutcome::default();
        assert!(ok.is_complete());
        assert!(ok.into_result().unwrap().is_empty());

        let failed = CancelOutcome {
            error: Some(GatewayError::InvalidRequest("x".into())),
            ..Default::default()
        };
        assert!(failed.into_result().is_err());
    }
}
