use std::collections::BTreeSet;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, warn};

use super::{Reconciler, RefreshKind, TickOutcome, TickReport};
use crate::orders::{Order, OrderStatus};
use crate::remote::{RemoteOrder, RemoteStatus, StatusQuery};

/// What applying one remote order did locally
enum Applied {
    Changed,
    Unchanged,
    UnknownStatus,
}

impl Reconciler {
    /// Poll the exchange for every open order and apply the transitions.
    pub async fn refresh_orders(&self) -> TickOutcome {
        let kind = RefreshKind::Orders;
        let Ok(_running) = self.order_tick.try_lock() else {
            return self.tick_skipped(kind);
        };
        let timer = self
            .metrics
            .tick_seconds
            .with_label_values(&[kind.as_str()])
            .start_timer();

        let open = self.store.open_orders().await;
        let queries = self.status_queries(&open);

        let mut report = TickReport::default();
        let mut results = stream::iter(queries)
            .map(|query| self.sync_query(query))
            .buffer_unordered(self.config.max_concurrency);
        while let Some(partial) = results.next().await {
            report += partial;
        }

        self.metrics
            .open_orders
            .set(self.store.open_count().await as i64);
        timer.observe_duration();

        debug!(
            exchange = %self.exchange,
            queries = report.queries,
            fetched = report.fetched,
            applied = report.applied,
            "Order refresh complete"
        );
        self.tick_completed(kind, report)
    }

    /// One query per market when the exchange can list orders by market,
    /// otherwise one per order.
    fn status_queries(&self, open: &[Order]) -> Vec<StatusQuery> {
        if self.remote.supports_market_query() {
            let markets: BTreeSet<&str> = open.iter().map(|o| o.market.as_str()).collect();
            markets
                .into_iter()
                .map(|m| StatusQuery::Market(m.to_string()))
                .collect()
        } else {
            open.iter()
                .filter(|o| !o.order_id.is_synthetic())
                .map(|o| StatusQuery::Order {
                    order_id: o.order_id,
                    market: o.market.clone(),
                })
                .collect()
        }
    }

    async fn sync_query(&self, query: StatusQuery) -> TickReport {
        let mut report = TickReport {
            queries: 1,
            ..Default::default()
        };

        let remote_orders = match self.remote.fetch_order_status(&query).await {
            Ok(orders) => orders,
            Err(e) if e.is_transient() => {
                warn!(
                    exchange = %self.exchange,
                    market = query.market(),
                    error = %e,
                    "Order status fetch failed, retrying next tick"
                );
                report.failed = 1;
                return report;
            }
            Err(e) => {
                error!(
                    exchange = %self.exchange,
                    market = query.market(),
                    error = %e,
                    "Order status fetch rejected"
                );
                report.failed = 1;
                return report;
            }
        };

        report.fetched = remote_orders.len();
        for remote in &remote_orders {
            match self.apply_remote(remote).await {
                Applied::Changed => report.applied += 1,
                Applied::Unchanged => {}
                Applied::UnknownStatus => report.unknown_status += 1,
            }
        }
        report
    }

    async fn apply_remote(&self, remote: &RemoteOrder) -> Applied {
        let local = match self.store.get_order_info(remote.order_id).await {
            Ok(order) if !order.is_terminal() => order,
            Ok(_) => return Applied::Unchanged,
            Err(_) => {
                debug!(order_id = %remote.order_id, "Remote order not tracked locally");
                return Applied::Unchanged;
            }
        };

        let status = self.remote.classify_status(&remote.status_code);
        let result = match status {
            RemoteStatus::Resting | RemoteStatus::PartiallyFilled => {
                let next = if status == RemoteStatus::Resting {
                    OrderStatus::Opened
                } else {
                    OrderStatus::Partial
                };
                if local.status == next
                    && local.accepted.is_some()
                    && local.completed_amount == remote.filled_amount
                    && local.fee == remote.fee
                {
                    return Applied::Unchanged;
                }
                let accepted = local.accepted.or(remote.opened_at).or_else(|| Some(Utc::now()));
                self.store
                    .update_order(Order {
                        status: next,
                        accepted,
                        completed_amount: remote.filled_amount,
                        fee: remote.fee,
                        completed: None,
                        ..local
                    })
                    .await
                    .map(|_| ())
            }
            RemoteStatus::Filled => self
                .store
                .complete_with_fee(remote.order_id, Utc::now(), Some(remote.fee))
                .await
                .map(|_| ()),
            RemoteStatus::Cancelled if remote.filled_amount > local.completed_amount => {
                // Keep executions that happened before the cancel.
                self.store
                    .update_order(Order {
                        status: OrderStatus::Cancelled,
                        completed_amount: remote.filled_amount,
                        fee: remote.fee,
                        completed: remote.updated_at,
                        ..local
                    })
                    .await
                    .map(|_| ())
            }
            RemoteStatus::Cancelled => {
                self.store.cancel(&[remote.order_id]).await;
                Ok(())
            }
            RemoteStatus::Unknown => {
                warn!(
                    exchange = %self.exchange,
                    order_id = %remote.order_id,
                    code = %remote.status_code,
                    "Unrecognized remote status, leaving order unchanged"
                );
                return Applied::UnknownStatus;
            }
        };

        match result {
            Ok(()) => Applied::Changed,
            Err(e) => {
                warn!(
                    exchange = %self.exchange,
                    order_id = %remote.order_id,
                    error = %e,
                    "Remote order state not applied"
                );
                Applied::Unchanged
            }
        }
    }
}
