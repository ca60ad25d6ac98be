//! Thread-safe order registry
//!
//! Orders are partitioned into an open set and a completed set behind a
//! single lock, so every operation moves an order between the two sets in
//! one critical section. Orders are never deleted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{Order, OrderId, OrderStatus};

/// Contract violations raised by [`OrderStore`].
///
/// These indicate an integration bug, not a transient condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderStoreError {
    #[error("Order already exists: {0}")]
    Exist(OrderId),

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Invalid status {1} for order {0}")]
    InvalidStatus(OrderId, OrderStatus),

    #[error("Invalid state transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Completed amount {completed} exceeds amount {amount} for order {order_id}")]
    InvalidFill {
        order_id: OrderId,
        completed: Decimal,
        amount: Decimal,
    },
}

#[derive(Debug, Default)]
struct Partition {
    open: HashMap<OrderId, Order>,
    completed: HashMap<OrderId, Order>,
}

impl Partition {
    fn contains(&self, id: &OrderId) -> bool {
        self.open.contains_key(id) || self.completed.contains_key(id)
    }
}

/// In-memory registry of orders, shared by the exchange facade and the
/// reconciler.
///
/// Each operation holds the write lock for its whole read-modify-write, so
/// an order is always in exactly one of the two sets.
#[derive(Debug, Default)]
pub struct OrderStore {
    inner: RwLock<Partition>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new order.
    ///
    /// Orders pushed with a terminal status go straight to the completed set.
    pub async fn push(&self, mut order: Order) -> Result<(), OrderStoreError> {
        let mut inner = self.inner.write().await;
        let id = order.order_id;

        if inner.contains(&id) {
            return Err(OrderStoreError::Exist(id));
        }
        if !order.status.is_valid_initial() {
            return Err(OrderStoreError::InvalidStatus(id, order.status));
        }
        if !fill_in_range(order.completed_amount, order.amount) {
            return Err(OrderStoreError::InvalidFill {
                order_id: id,
                completed: order.completed_amount,
                amount: order.amount,
            });
        }
        if order.status == OrderStatus::Completed {
            order.completed_amount = order.amount;
        }

        if order.status.is_terminal() {
            order.completed.get_or_insert_with(Utc::now);
            debug!(order_id = %id, status = %order.status, "Order pushed as completed");
            inner.completed.insert(id, order);
        } else {
            order.completed = None;
            debug!(order_id = %id, status = %order.status, "Order pushed as open");
            inner.open.insert(id, order);
        }

        Ok(())
    }

    /// Apply a new status and execution state to a tracked order.
    ///
    /// Only the mutable fields (`status`, `accepted`, `completed_amount`,
    /// `fee`, `completed`) are taken from `order`. A terminal status moves
    /// the order to the completed set in the same call.
    pub async fn update_order(&self, order: Order) -> Result<Order, OrderStoreError> {
        let mut inner = self.inner.write().await;
        let id = order.order_id;

        let current = match inner.open.get(&id) {
            Some(current) => current,
            None => {
                return Err(match inner.completed.get(&id) {
                    Some(done) => OrderStoreError::InvalidTransition {
                        order_id: id,
                        from: done.status,
                        to: order.status,
                    },
                    None => OrderStoreError::NotFound(id),
                })
            }
        };

        if !current.status.can_transition_to(order.status) {
            return Err(OrderStoreError::InvalidTransition {
                order_id: id,
                from: current.status,
                to: order.status,
            });
        }
        if !fill_in_range(order.completed_amount, current.amount) {
            return Err(OrderStoreError::InvalidFill {
                order_id: id,
                completed: order.completed_amount,
                amount: current.amount,
            });
        }

        let old_status = current.status;
        let mut updated = current.clone();
        updated.status = order.status;
        updated.accepted = order.accepted.or(updated.accepted);
        // A completed order is fully filled, whatever amount was reported.
        updated.completed_amount = if order.status == OrderStatus::Completed {
            current.amount
        } else {
            order.completed_amount
        };
        updated.fee = order.fee;
        updated.completed = if order.status.is_terminal() {
            Some(order.completed.unwrap_or_else(Utc::now))
        } else {
            None
        };

        if updated.status.is_terminal() {
            inner.open.remove(&id);
            inner.completed.insert(id, updated.clone());
        } else {
            inner.open.insert(id, updated.clone());
        }

        info!(
            order_id = %id,
            market = %updated.market,
            old_status = %old_status,
            new_status = %updated.status,
            completed_amount = %updated.completed_amount,
            amount = %updated.amount,
            "Order updated"
        );

        Ok(updated)
    }

    /// Cancel every id that is currently open.
    ///
    /// Unknown or already finished ids are skipped. Returns the orders that
    /// were actually cancelled by this call.
    pub async fn cancel(&self, order_ids: &[OrderId]) -> Vec<Order> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut cancelled = Vec::with_capacity(order_ids.len());

        for id in order_ids {
            let Some(mut order) = inner.open.remove(id) else {
                debug!(order_id = %id, "Cancel skipped, order not open");
                continue;
            };
            order.status = OrderStatus::Cancelled;
            order.completed = Some(now);
            info!(order_id = %id, market = %order.market, "Order cancelled");
            inner.completed.insert(*id, order.clone());
            cancelled.push(order);
        }

        cancelled
    }

    /// Mark an open order as fully filled.
    pub async fn complete(
        &self,
        order_id: OrderId,
        completed_at: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError> {
        self.complete_with_fee(order_id, completed_at, None).await
    }

    /// Mark an open order as fully filled, recording the final fee if known.
    ///
    /// Completing an already completed order is a no-op.
    pub async fn complete_with_fee(
        &self,
        order_id: OrderId,
        completed_at: DateTime<Utc>,
        fee: Option<Decimal>,
    ) -> Result<Order, OrderStoreError> {
        let mut inner = self.inner.write().await;

        if let Some(done) = inner.completed.get(&order_id) {
            return if done.status == OrderStatus::Completed {
                Ok(done.clone())
            } else {
                Err(OrderStoreError::InvalidTransition {
                    order_id,
                    from: done.status,
                    to: OrderStatus::Completed,
                })
            };
        }

        let mut order = inner
            .open
            .remove(&order_id)
            .ok_or(OrderStoreError::NotFound(order_id))?;

        order.status = OrderStatus::Completed;
        order.completed = Some(completed_at);
        order.completed_amount = order.amount;
        if let Some(fee) = fee {
            order.fee = fee;
        }

        info!(
            order_id = %order_id,
            market = %order.market,
            amount = %order.amount,
            fee = %order.fee,
            "Order completed"
        );

        inner.completed.insert(order_id, order.clone());
        Ok(order)
    }

    /// Look up an order in the open set, then the completed set.
    pub async fn get_order_info(&self, order_id: OrderId) -> Result<Order, OrderStoreError> {
        let inner = self.inner.read().await;
        inner
            .open
            .get(&order_id)
            .or_else(|| inner.completed.get(&order_id))
            .cloned()
            .ok_or(OrderStoreError::NotFound(order_id))
    }

    /// Ids of open orders, ascending.
    pub async fn get_opened(&self) -> Vec<OrderId> {
        let inner = self.inner.read().await;
        sorted_ids(&inner.open)
    }

    /// Ids of completed (terminal) orders, ascending.
    pub async fn get_completed(&self) -> Vec<OrderId> {
        let inner = self.inner.read().await;
        sorted_ids(&inner.completed)
    }

    /// Snapshot of all open orders, ordered by id.
    pub async fn open_orders(&self) -> Vec<Order> {
        let inner = self.inner.read().await;
        sorted_orders(&inner.open)
    }

    /// Snapshot of all completed orders, ordered by id.
    pub async fn completed_orders(&self) -> Vec<Order> {
        let inner = self.inner.read().await;
        sorted_orders(&inner.completed)
    }

    pub async fn open_count(&self) -> usize {
        self.inner.read().await.open.len()
    }

    /// Total number of orders ever pushed.
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.open.len() + inner.completed.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn fill_in_range(completed: Decimal, amount: Decimal) -> bool {
    completed >= Decimal::ZERO && completed <= amount
}

fn sorted_ids(orders: &HashMap<OrderId, Order>) -> Vec<OrderId> {
    let mut ids: Vec<OrderId> = orders.keys().copied().collect();
    ids.sort_unstable();
    ids
}

fn sorted_orders(orders: &HashMap<OrderId, Order>) -> Vec<Order> {
    let mut list: Vec<Order> = orders.values().cloned().collect();
    list.sort_unstable_by_key(|o| o.order_id);
    list
}
