//! Prometheus metrics for one exchange instance
//!
//! Collectors are registered into a caller-owned [`Registry`] with a
//! constant `exchange` label, so several instances can share a registry.

use std::collections::HashMap;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Refresh kinds reported by the reconciler
pub const KIND_ORDERS: &str = "orders";
pub const KIND_ORDERBOOKS: &str = "orderbooks";

#[derive(Clone)]
pub struct GatewayMetrics {
    /// Orders accepted by the exchange, by side
    pub orders_placed: IntCounterVec,
    pub orders_cancelled: IntCounter,
    /// Failed remote calls on the facade path, by operation
    pub remote_errors: IntCounterVec,
    /// Reconciler ticks, by kind and outcome (completed|skipped)
    pub reconcile_ticks: IntCounterVec,
    /// Per-market fetch failures inside a tick, by kind
    pub fetch_errors: IntCounterVec,
    pub tick_seconds: HistogramVec,
    pub open_orders: IntGauge,
}

impl GatewayMetrics {
    pub fn new(registry: &Registry, exchange: &str) -> prometheus::Result<Self> {
        let labels: HashMap<String, String> =
            HashMap::from([("exchange".to_string(), exchange.to_string())]);
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        let orders_placed = IntCounterVec::new(
            opts("gateway_orders_placed_total", "Orders accepted by the exchange"),
            &["side"],
        )?;
        let orders_cancelled = IntCounter::with_opts(opts(
            "gateway_orders_cancelled_total",
            "Orders cancelled through the gateway",
        ))?;
        let remote_errors = IntCounterVec::new(
            opts("gateway_remote_errors_total", "Failed remote exchange calls"),
            &["operation"],
        )?;
        let reconcile_ticks = IntCounterVec::new(
            opts("gateway_reconcile_ticks_total", "Reconciler ticks"),
            &["kind", "outcome"],
        )?;
        let fetch_errors = IntCounterVec::new(
            opts(
                "gateway_reconcile_fetch_errors_total",
                "Per-market fetch failures during reconciliation",
            ),
            &["kind"],
        )?;
        let tick_seconds = HistogramVec::new(
            HistogramOpts::new("gateway_reconcile_tick_seconds", "Reconciler tick duration")
                .const_labels(labels.clone()),
            &["kind"],
        )?;
        let open_orders = IntGauge::with_opts(opts("gateway_open_orders", "Orders in the open set"))?;

        registry.register(Box::new(orders_placed.clone()))?;
        registry.register(Box::new(orders_cancelled.clone()))?;
        registry.register(Box::new(remote_errors.clone()))?;
        registry.register(Box::new(reconcile_ticks.clone()))?;
        registry.register(Box::new(fetch_errors.clone()))?;
        registry.register(Box::new(tick_seconds.clone()))?;
        registry.register(Box::new(open_orders.clone()))?;

        Ok(Self {
            orders_placed,
            orders_cancelled,
            remote_errors,
            reconcile_ticks,
            fetch_errors,
            tick_seconds,
            open_orders,
        })
    }
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_exchanges_share_a_registry() {
        let registry = Registry::new();
        let a = GatewayMetrics::new(&registry, "alpha").unwrap();
        let b = GatewayMetrics::new(&registry, "beta").unwrap();

        a.orders_placed.with_label_values(&["buy"]).inc();
        b.orders_cancelled.inc();

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "gateway_orders_placed_total"));
    }

    #[test]
    fn test_duplicate_exchange_is_rejected() {
        let registry = Registry::new();
        GatewayMetrics::new(&registry, "alpha").unwrap();
        assert!(GatewayMetrics::new(&registry, "alpha").is_err());
    }
}
