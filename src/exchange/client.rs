//! Exchange client facade
//!
//! One [`ExchangeClient`] per exchange instance owns its order store,
//! orderbook cache, metrics and reconciler. Callers only go through the
//! methods here; nothing is process-global.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use prometheus::Registry;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::requests::{CancelOutcome, OrderRequest};
use crate::error::{GatewayError, Result};
use crate::metrics::GatewayMetrics;
use crate::orderbook::{MarketRecord, OrderbookCache};
use crate::orders::{Order, OrderId, OrderStatus, OrderStore, OrderStoreError, OrderType};
use crate::reconciler::{Reconciler, ReconcilerConfig, ReconcilerHandle};
use crate::remote::{RemoteError, RemoteExchangeApi};
use crate::symbol::same_market;

/// Unified order operations for one exchange
pub struct ExchangeClient {
    name: String,
    remote: Arc<dyn RemoteExchangeApi>,
    store: Arc<OrderStore>,
    cache: OrderbookCache,
    metrics: GatewayMetrics,
    reconciler: Arc<Reconciler>,
    running: Mutex<Option<ReconcilerHandle>>,
    /// Next id for instantly executed orders, counts down from -1
    next_synthetic: AtomicI64,
}

impl ExchangeClient {
    pub fn new(
        name: impl Into<String>,
        remote: Arc<dyn RemoteExchangeApi>,
        cache: OrderbookCache,
        config: ReconcilerConfig,
        registry: &Registry,
    ) -> Result<Self> {
        let name = name.into();
        config.validate()?;
        let metrics = GatewayMetrics::new(registry, &name)?;
        let store = Arc::new(OrderStore::new());
        let reconciler = Arc::new(Reconciler::new(
            name.clone(),
            remote.clone(),
            store.clone(),
            cache.clone(),
            metrics.clone(),
            config,
        ));

        Ok(Self {
            name,
            remote,
            store,
            cache,
            metrics,
            reconciler,
            running: Mutex::new(None),
            next_synthetic: AtomicI64::new(-1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<OrderStore> {
        &self.store
    }

    pub fn cache(&self) -> &OrderbookCache {
        &self.cache
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Start the background reconciler. Calling it twice is a no-op.
    pub async fn start(&self) {
        self.start_with(CancellationToken::new()).await
    }

    /// Start the reconciler under a parent token; cancelling `parent` stops
    /// it as well.
    pub async fn start_with(&self, parent: CancellationToken) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!(exchange = %self.name, "Reconciler already running");
            return;
        }
        *running = Some(self.reconciler.clone().spawn(parent.child_token()));
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Stop the reconciler and wait for both loops to exit.
    pub async fn shutdown(&self) {
        let handle = self.running.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!(exchange = %self.name, "Exchange client stopped");
        }
    }

    pub async fn buy(&self, request: &OrderRequest) -> Result<OrderId> {
        self.place(OrderType::Buy, request).await
    }

    pub async fn sell(&self, request: &OrderRequest) -> Result<OrderId> {
        self.place(OrderType::Sell, request).await
    }

    async fn place(&self, order_type: OrderType, request: &OrderRequest) -> Result<OrderId> {
        let new_order = request.to_new_order(order_type)?;

        let ack = self
            .remote
            .place_order(&new_order)
            .await
            .map_err(|e| self.remote_failure("place_order", e))?;

        let mut order = match ack.order_id {
            None => {
                let id = OrderId::new(self.next_synthetic.fetch_sub(1, Ordering::Relaxed));
                let mut order = Order::new(
                    id,
                    new_order.symbol,
                    order_type,
                    new_order.price,
                    new_order.amount,
                )
                .with_status(OrderStatus::Completed);
                order.completed_amount = order.amount;
                order.accepted = Some(order.submitted);
                order.completed = Some(order.submitted);
                info!(exchange = %self.name, order_id = %id, "Order executed immediately");
                order
            }
            Some(id) if id.value() <= 0 => {
                error!(exchange = %self.name, order_id = %id, "Exchange returned a non-positive order id");
                return Err(self.remote_failure(
                    "place_order",
                    RemoteError::Protocol(format!("Invalid order id {}", id)),
                ));
            }
            Some(id) => {
                let mut order = Order::new(
                    id,
                    new_order.symbol,
                    order_type,
                    new_order.price,
                    new_order.amount,
                );
                if ack.accepted {
                    order.status = OrderStatus::Opened;
                    order.accepted = Some(Utc::now());
                }
                order
            }
        };
        order.fee = ack.fee;

        let order_id = order.order_id;
        info!(
            exchange = %self.name,
            order_id = %order_id,
            market = %order.market,
            side = %order_type,
            price = %order.price,
            amount = %order.amount,
            status = %order.status,
            "Order placed"
        );
        self.store.push(order).await?;
        let side = order_type.to_string();
        self.metrics
            .orders_placed
            .with_label_values(&[side.as_str()])
            .inc();
        self.update_open_gauge().await;

        Ok(order_id)
    }

    /// Cancel one open order on the exchange, then locally.
    ///
    /// Returns the order as stored after the cancel. Finished orders are
    /// rejected without contacting the exchange.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order> {
        let order = self.store.get_order_info(order_id).await?;
        if order.is_terminal() {
            return Err(OrderStoreError::InvalidTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Cancelled,
            }
            .into());
        }

        self.remote
            .cancel_order(order_id)
            .await
            .map_err(|e| self.remote_failure("cancel_order", e))?;

        if !self.store.cancel(&[order_id]).await.is_empty() {
            self.metrics.orders_cancelled.inc();
            self.update_open_gauge().await;
        }
        Ok(self.store.get_order_info(order_id).await?)
    }

    async fn update_open_gauge(&self) {
        self.metrics
            .open_orders
            .set(self.store.open_count().await as i64);
    }

    /// Cancel every open order.
    pub async fn cancel_all(&self) -> CancelOutcome {
        let open = self.store.open_orders().await;
        self.cancel_each(open).await
    }

    /// Cancel every open order in one market.
    pub async fn cancel_market(&self, symbol: &str) -> CancelOutcome {
        let open = self
            .store
            .open_orders()
            .await
            .into_iter()
            .filter(|o| same_market(&o.market, symbol))
            .collect();
        self.cancel_each(open).await
    }

    async fn cancel_each(&self, orders: Vec<Order>) -> CancelOutcome {
        let mut outcome = CancelOutcome::default();

        for order in orders {
            let order_id = order.order_id;
            match self.cancel(order_id).await {
                Ok(cancelled) => outcome.cancelled.push(cancelled),
                Err(e) => {
                    warn!(exchange = %self.name, order_id = %order_id, error = %e, "Cancel failed, continuing");
                    outcome.failed.push(order_id);
                    if outcome.error.is_none() {
                        outcome.error = Some(GatewayError::CancelFailed {
                            order_id,
                            source: Box::new(e),
                        });
                    }
                }
            }
        }

        outcome
    }

    pub async fn order_status(&self, order_id: OrderId) -> Result<OrderStatus> {
        Ok(self.store.get_order_info(order_id).await?.status)
    }

    pub async fn order_details(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.store.get_order_info(order_id).await?)
    }

    pub async fn open_orders(&self) -> Vec<Order> {
        self.store.open_orders().await
    }

    /// Orders that reached a terminal status.
    pub async fn completed(&self) -> Vec<Order> {
        self.store.completed_orders().await
    }

    /// Orders with any executed quantity, open or finished, by id.
    pub async fn executed(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .store
            .open_orders()
            .await
            .into_iter()
            .chain(self.store.completed_orders().await)
            .filter(Order::has_executions)
            .collect();
        orders.sort_by_key(|o| o.order_id);
        orders
    }

    pub async fn orderbook(&self, symbol: &str) -> Result<MarketRecord> {
        Ok(self.cache.get(symbol).await?)
    }

    pub async fn balance(&self, currency: &str) -> Result<Decimal> {
        self.remote
            .fetch_balance(currency)
            .await
            .map_err(|e| self.remote_failure("fetch_balance", e))
    }

    /// Markets the reconciler currently refreshes.
    pub async fn markets(&self) -> Vec<String> {
        self.reconciler.tracked_symbols().await
    }

    fn remote_failure(&self, operation: &str, e: RemoteError) -> GatewayError {
        warn!(exchange = %self.name, operation, error = %e, "Remote call failed");
        self.metrics
            .remote_errors
            .with_label_values(&[operation])
            .inc();
        e.into()
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
