//! Order lifecycle tracking
//!
//! - `OrderStore` - open/completed partition of every order placed
//! - `Order`, `OrderStatus` - order record and its status state machine

mod store;
mod types;

pub use store::{OrderStore, OrderStoreError};
pub use types::{Order, OrderId, OrderStatus, OrderType};
