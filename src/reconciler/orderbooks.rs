use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, warn};

use super::{Reconciler, RefreshKind, TickOutcome, TickReport};

impl Reconciler {
    /// Fetch and cache the orderbook of every tracked market.
    ///
    /// Each snapshot is written as soon as its response arrives.
    pub async fn refresh_orderbooks(&self) -> TickOutcome {
        let kind = RefreshKind::Orderbooks;
        let Ok(_running) = self.orderbook_tick.try_lock() else {
            return self.tick_skipped(kind);
        };
        let timer = self
            .metrics
            .tick_seconds
            .with_label_values(&[kind.as_str()])
            .start_timer();

        let symbols = self.tracked_symbols().await;
        let mut report = TickReport {
            queries: symbols.len(),
            ..Default::default()
        };

        let mut results = stream::iter(symbols)
            .map(|symbol| self.sync_orderbook(symbol))
            .buffer_unordered(self.config.max_concurrency);
        while let Some(written) = results.next().await {
            if written {
                report.fetched += 1;
                report.applied += 1;
            } else {
                report.failed += 1;
            }
        }

        timer.observe_duration();
        debug!(
            exchange = %self.exchange,
            symbols = report.queries,
            failed = report.failed,
            "Orderbook refresh complete"
        );
        self.tick_completed(kind, report)
    }

    async fn sync_orderbook(&self, symbol: String) -> bool {
        let rows = match self.remote.fetch_orderbook(&symbol).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    exchange = %self.exchange,
                    symbol = %symbol,
                    error = %e,
                    "Orderbook fetch failed, keeping previous snapshot"
                );
                return false;
            }
        };

        match self.cache.update(&symbol, rows.bids, rows.asks).await {
            Ok(_) => true,
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Failed to store orderbook snapshot");
                false
            }
        }
    }
}
