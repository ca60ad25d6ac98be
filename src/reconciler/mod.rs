//! Exchange reconciliation
//!
//! Two independent periodic refreshes per exchange instance:
//! - order refresh: polls order status for every open order and applies the
//!   transitions to the [`OrderStore`]
//! - orderbook refresh: polls bid/ask rows for every tracked market and
//!   replaces the snapshot in the [`OrderbookCache`]
//!
//! Each refresh fans out one request per market with bounded concurrency and
//! joins before the tick ends. A tick of one kind never overlaps another tick
//! of the same kind: a tick that finds the previous one still running is
//! skipped.

mod orderbooks;
mod orders;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::metrics::{GatewayMetrics, KIND_ORDERBOOKS, KIND_ORDERS};
use crate::orderbook::OrderbookCache;
use crate::orders::OrderStore;
use crate::remote::RemoteExchangeApi;
use crate::symbol::normalize_symbol;

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Interval between order status refreshes
    pub order_interval: Duration,
    /// Interval between orderbook refreshes
    pub orderbook_interval: Duration,
    /// Maximum in-flight requests per tick
    pub max_concurrency: usize,
    /// Markets whose orderbook is refreshed even without open orders
    pub symbols: Vec<String>,
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.order_interval.is_zero() || self.orderbook_interval.is_zero() {
            return Err(GatewayError::Config(
                "Refresh intervals must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(GatewayError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            order_interval: Duration::from_secs(2),
            orderbook_interval: Duration::from_secs(1),
            max_concurrency: 8,
            symbols: Vec::new(),
        }
    }
}

/// Which refresh a tick belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Orders,
    Orderbooks,
}

impl RefreshKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => KIND_ORDERS,
            Self::Orderbooks => KIND_ORDERBOOKS,
        }
    }
}

/// Counters for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Remote requests issued (one per market, or per order)
    pub queries: usize,
    /// Remote orders or books received
    pub fetched: usize,
    /// Local changes written
    pub applied: usize,
    /// Remote orders with an unrecognized status code
    pub unknown_status: usize,
    /// Requests that failed and were skipped
    pub failed: usize,
}

impl std::ops::AddAssign for TickReport {
    fn add_assign(&mut self, other: Self) {
        self.queries += other.queries;
        self.fetched += other.fetched;
        self.applied += other.applied;
        self.unknown_status += other.unknown_status;
        self.failed += other.failed;
    }
}

/// Result of a refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// The previous tick of the same kind was still running
    Skipped,
}

/// Background synchronizer between one remote exchange and local state
pub struct Reconciler {
    exchange: String,
    remote: Arc<dyn RemoteExchangeApi>,
    store: Arc<OrderStore>,
    cache: OrderbookCache,
    metrics: GatewayMetrics,
    config: ReconcilerConfig,
    order_tick: Mutex<()>,
    orderbook_tick: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        exchange: impl Into<String>,
        remote: Arc<dyn RemoteExchangeApi>,
        store: Arc<OrderStore>,
        cache: OrderbookCache,
        metrics: GatewayMetrics,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            remote,
            store,
            cache,
            metrics,
            config,
            order_tick: Mutex::new(()),
            orderbook_tick: Mutex::new(()),
        }
    }

    /// Run one refresh of the given kind.
    pub async fn refresh(&self, kind: RefreshKind) -> TickOutcome {
        match kind {
            RefreshKind::Orders => self.refresh_orders().await,
            RefreshKind::Orderbooks => self.refresh_orderbooks().await,
        }
    }

    /// Configured markets plus every market with an open order, canonical
    /// and sorted.
    pub async fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols: BTreeSet<String> = self
            .config
            .symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .collect();
        for order in self.store.open_orders().await {
            symbols.insert(normalize_symbol(&order.market));
        }
        symbols.into_iter().collect()
    }

    /// Start both refresh loops. They stop when `token` is cancelled.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> ReconcilerHandle {
        info!(
            exchange = %self.exchange,
            order_interval_ms = self.config.order_interval.as_millis() as u64,
            orderbook_interval_ms = self.config.orderbook_interval.as_millis() as u64,
            "Starting reconciler"
        );

        let tasks = [RefreshKind::Orders, RefreshKind::Orderbooks]
            .into_iter()
            .map(|kind| tokio::spawn(self.clone().run(kind, token.clone())))
            .collect();

        ReconcilerHandle { token, tasks }
    }

    async fn run(self: Arc<Self>, kind: RefreshKind, token: CancellationToken) {
        let period = match kind {
            RefreshKind::Orders => self.config.order_interval,
            RefreshKind::Orderbooks => self.config.orderbook_interval,
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // In-flight requests are dropped on shutdown; store writes are
            // per-order atomic so an abandoned tick leaves no partial state.
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(exchange = %self.exchange, kind = kind.as_str(), "Tick abandoned on shutdown");
                    break;
                }
                outcome = self.refresh(kind) => {
                    if let TickOutcome::Completed(report) = outcome {
                        if report.failed > 0 {
                            warn!(
                                exchange = %self.exchange,
                                kind = kind.as_str(),
                                failed = report.failed,
                                queries = report.queries,
                                "Tick completed with failures"
                            );
                        }
                    }
                }
            }
        }

        info!(exchange = %self.exchange, kind = kind.as_str(), "Refresh loop stopped");
    }

    fn tick_skipped(&self, kind: RefreshKind) -> TickOutcome {
        debug!(
            exchange = %self.exchange,
            kind = kind.as_str(),
            "Previous tick still running, skipping"
        );
        self.metrics
            .reconcile_ticks
            .with_label_values(&[kind.as_str(), "skipped"])
            .inc();
        TickOutcome::Skipped
    }

    fn tick_completed(&self, kind: RefreshKind, report: TickReport) -> TickOutcome {
        self.metrics
            .reconcile_ticks
            .with_label_values(&[kind.as_str(), "completed"])
            .inc();
        if report.failed > 0 {
            self.metrics
                .fetch_errors
                .with_label_values(&[kind.as_str()])
                .inc_by(report.failed as u64);
        }
        TickOutcome::Completed(report)
    }
}

/// Running reconciler loops
pub struct ReconcilerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Cancel both loops and wait for them to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Reconciler task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::MarketOrder;
    use crate::orders::{Order, OrderId, OrderStatus, OrderType};
    use crate::remote::{NewOrder, PaperExchange};
    use prometheus::Registry;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Fixture {
        paper: Arc<PaperExchange>,
        store: Arc<OrderStore>,
        cache: OrderbookCache,
        reconciler: Arc<Reconciler>,
    }

    async fn fixture(paper: PaperExchange, symbols: &[&str]) -> Fixture {
        let paper = Arc::new(paper);
        for symbol in ["BTC/USDT", "ETH/USDT"] {
            paper
                .seed_book(
                    symbol,
                    vec![MarketOrder::new(dec!(90), dec!(5))],
                    vec![MarketOrder::new(dec!(110), dec!(5))],
                )
                .await;
        }

        let store = Arc::new(OrderStore::new());
        let cache = OrderbookCache::in_memory();
        let metrics = GatewayMetrics::new(&Registry::new(), "paper").unwrap();
        let config = ReconcilerConfig {
            order_interval: Duration::from_millis(100),
            orderbook_interval: Duration::from_millis(100),
            max_concurrency: 2,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        };
        let reconciler = Arc::new(Reconciler::new(
            "paper",
            paper.clone(),
            store.clone(),
            cache.clone(),
            metrics,
            config,
        ));

        Fixture {
            paper,
            store,
            cache,
            reconciler,
        }
    }

    /// Place a resting order remotely and track it locally.
    async fn place(f: &Fixture, market: &str, amount: Decimal) -> OrderId {
        let ack = f
            .paper
            .place_order(&NewOrder {
                symbol: market.to_string(),
                order_type: OrderType::Buy,
                price: dec!(100),
                amount,
            })
            .await
            .unwrap();
        let id = ack.order_id.unwrap();
        f.store
            .push(Order::new(id, market, OrderType::Buy, dec!(100), amount))
            .await
            .unwrap();
        id
    }

    fn report(outcome: TickOutcome) -> TickReport {
        match outcome {
            TickOutcome::Completed(report) => report,
            TickOutcome::Skipped => panic!("Expected a completed tick"),
        }
    }

    #[tokio::test]
    async fn test_order_refresh_applies_remote_transitions() {
        let f = fixture(PaperExchange::default(), &[]).await;
        let resting = place(&f, "BTC/USDT", dec!(10)).await;
        let partial = place(&f, "BTC/USDT", dec!(10)).await;
        let filled = place(&f, "ETH/USDT", dec!(10)).await;
        let cancelled = place(&f, "ETH/USDT", dec!(10)).await;

        f.paper.fill(partial, dec!(4)).await.unwrap();
        f.paper.fill(filled, dec!(10)).await.unwrap();
        f.paper.cancel_order(cancelled).await.unwrap();

        let r = report(f.reconciler.refresh_orders().await);
        assert_eq!(r.queries, 2);
        assert_eq!(r.fetched, 4);
        assert_eq!(r.applied, 4);
        assert_eq!(r.failed, 0);

        let o = f.store.get_order_info(resting).await.unwrap();
        assert_eq!(o.status, OrderStatus::Opened);
        assert!(o.accepted.is_some());

        let o = f.store.get_order_info(partial).await.unwrap();
        assert_eq!(o.status, OrderStatus::Partial);
        assert_eq!(o.completed_amount, dec!(4));

        let o = f.store.get_order_info(filled).await.unwrap();
        assert_eq!(o.status, OrderStatus::Completed);
        assert_eq!(o.completed_amount, dec!(10));
        assert_eq!(o.fee, dec!(1.000));

        let o = f.store.get_order_info(cancelled).await.unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);

        assert_eq!(f.store.get_opened().await, vec![resting, partial]);

        // Nothing changed remotely: the next tick writes nothing.
        let r = report(f.reconciler.refresh_orders().await);
        assert_eq!(r.applied, 0);
    }

    #[tokio::test]
    async fn test_unknown_status_code_is_skipped() {
        let f = fixture(PaperExchange::default(), &[]).await;
        let id = place(&f, "BTC/USDT", dec!(1)).await;
        f.paper.set_status_code(id, "PENDING_REPLACE").await.unwrap();

        let r = report(f.reconciler.refresh_orders().await);
        assert_eq!(r.unknown_status, 1);
        assert_eq!(r.applied, 0);

        let o = f.store.get_order_info(id).await.unwrap();
        assert_eq!(o.status, OrderStatus::Submitted);
    }

    #[tokio::test]
    async fn test_failing_market_does_not_block_others() {
        let f = fixture(PaperExchange::default(), &[]).await;
        let btc = place(&f, "BTC/USDT", dec!(2)).await;
        let eth = place(&f, "ETH/USDT", dec!(2)).await;
        f.paper.fill(btc, dec!(2)).await.unwrap();
        f.paper.fill(eth, dec!(2)).await.unwrap();
        f.paper.set_market_failing("BTC/USDT", true).await;

        let r = report(f.reconciler.refresh_orders().await);
        assert_eq!(r.failed, 1);
        assert_eq!(r.applied, 1);

        assert_eq!(
            f.store.get_order_info(btc).await.unwrap().status,
            OrderStatus::Submitted
        );
        assert_eq!(
            f.store.get_order_info(eth).await.unwrap().status,
            OrderStatus::Completed
        );

        f.paper.set_market_failing("BTC/USDT", false).await;
        report(f.reconciler.refresh_orders().await);
        assert_eq!(
            f.store.get_order_info(btc).await.unwrap().status,
            OrderStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_per_order_queries_when_market_query_unsupported() {
        let f = fixture(PaperExchange::default().without_market_queries(), &[]).await;
        let a = place(&f, "BTC/USDT", dec!(3)).await;
        let b = place(&f, "BTC/USDT", dec!(3)).await;
        f.paper.fill(a, dec!(1)).await.unwrap();

        let r = report(f.reconciler.refresh_orders().await);
        assert_eq!(r.queries, 2);
        assert_eq!(
            f.store.get_order_info(a).await.unwrap().status,
            OrderStatus::Partial
        );
        assert_eq!(
            f.store.get_order_info(b).await.unwrap().status,
            OrderStatus::Opened
        );
    }

    #[tokio::test]
    async fn test_cancelled_after_partial_fill_keeps_executed_amount() {
        let f = fixture(PaperExchange::default(), &[]).await;
        let id = place(&f, "ETH/USDT", dec!(5)).await;
        f.paper.fill(id, dec!(2)).await.unwrap();
        f.paper.cancel_order(id).await.unwrap();

        report(f.reconciler.refresh_orders().await);
        let o = f.store.get_order_info(id).await.unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.completed_amount, dec!(2));
        assert!(o.completed.is_some());
    }

    #[tokio::test]
    async fn test_orderbook_refresh_updates_tracked_symbols() {
        let f = fixture(PaperExchange::default(), &["btc_usdt"]).await;
        place(&f, "ETH/USDT", dec!(1)).await;

        assert_eq!(
            f.reconciler.tracked_symbols().await,
            vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
        );

        let r = report(f.reconciler.refresh_orderbooks().await);
        assert_eq!(r.queries, 2);
        assert_eq!(r.applied, 2);

        let eth = f.cache.get("ETH/USDT").await.unwrap();
        assert_eq!(eth.bids[0], MarketOrder::new(dec!(100), dec!(1)));
        assert_eq!(eth.asks[0], MarketOrder::new(dec!(110), dec!(5)));
        assert!(f.cache.get("BTC/USDT").await.is_ok());
    }

    #[tokio::test]
    async fn test_orderbook_failure_skips_only_that_symbol() {
        let f = fixture(PaperExchange::default(), &["BTC/USDT", "ETH/USDT"]).await;
        f.paper.set_market_failing("ETH/USDT", true).await;

        let r = report(f.reconciler.refresh_orderbooks().await);
        assert_eq!(r.failed, 1);
        assert!(f.cache.get("BTC/USDT").await.is_ok());
        assert!(f.cache.get("ETH/USDT").await.is_err());
    }

    #[tokio::test]
    async fn test_overlapping_ticks_are_skipped() {
        let f = fixture(PaperExchange::default(), &["BTC/USDT"]).await;

        let guard = f.reconciler.order_tick.lock().await;
        assert_eq!(f.reconciler.refresh_orders().await, TickOutcome::Skipped);
        // The other kind is independent.
        assert!(matches!(
            f.reconciler.refresh_orderbooks().await,
            TickOutcome::Completed(_)
        ));
        drop(guard);

        assert!(matches!(
            f.reconciler.refresh_orders().await,
            TickOutcome::Completed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loops_refresh_and_stop() {
        let f = fixture(PaperExchange::default(), &["BTC/USDT"]).await;
        let id = place(&f, "BTC/USDT", dec!(1)).await;
        f.paper.fill(id, dec!(1)).await.unwrap();

        let handle = f.reconciler.clone().spawn(CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(f.cache.get("BTC/USDT").await.is_ok());
        assert_eq!(
            f.store.get_order_info(id).await.unwrap().status,
            OrderStatus::Completed
        );

        handle.shutdown().await;
    }

    #[test]
    fn test_config_validation() {
        assert!(ReconcilerConfig::default().validate().is_ok());

        let zero = ReconcilerConfig {
            order_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(GatewayError::Config(_))));

        let no_workers = ReconcilerConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(no_workers.validate().is_err());
    }
}
