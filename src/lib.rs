//! ORPflow - Exchange Gateway Library
//!
//! This crate tracks the lifecycle of orders placed on remote exchanges,
//! keeps local state in sync with a background reconciler and caches the
//! latest orderbook snapshot per market.

pub mod config;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod orderbook;
pub mod orders;
pub mod reconciler;
pub mod remote;
pub mod symbol;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use exchange::{CancelOutcome, ExchangeClient, ExchangeRegistry, OrderRequest};
pub use metrics::GatewayMetrics;
pub use orderbook::{BookMetrics, MarketOrder, MarketRecord, OrderbookCache};
pub use orders::{Order, OrderId, OrderStatus, OrderStore, OrderStoreError, OrderType};
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerHandle, TickOutcome, TickReport};
pub use remote::{PaperExchange, RemoteError, RemoteExchangeApi};
pub use symbol::normalize_symbol;
