//! Error types for the exchange gateway

use thiserror::Error;

use crate::orderbook::CacheError;
use crate::orders::{OrderId, OrderStoreError};
use crate::remote::RemoteError;

/// Exchange gateway errors
///
/// `Remote` means the exchange refused or could not be reached; `Store`
/// means local bookkeeping was asked to do something inconsistent.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Remote exchange error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Order store error: {0}")]
    Store(#[from] OrderStoreError),

    #[error("Orderbook cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Cancel failed for order {order_id}: {source}")]
    CancelFailed {
        order_id: OrderId,
        #[source]
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// The failure came from the remote exchange.
    pub fn is_remote(&self) -> bool {
        match self {
            Self::Remote(_) => true,
            Self::CancelFailed { source, .. } => source.is_remote(),
            _ => false,
        }
    }

    /// Worth retrying later. Local invariant violations never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_transient(),
            Self::CancelFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
