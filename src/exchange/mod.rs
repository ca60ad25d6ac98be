//! Exchange client facade
//!
//! Buy/sell/cancel and read operations over one exchange instance, plus a
//! registry for running several instances side by side.

mod client;
mod registry;
mod requests;

pub use client::ExchangeClient;
pub use registry::ExchangeRegistry;
pub use requests::{CancelOutcome, OrderRequest};
