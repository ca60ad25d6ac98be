//! ORPflow - Exchange Gateway
//!
//! Runs one exchange client against the in-process paper exchange, keeps
//! its orders and orderbooks reconciled, and serves health and metrics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use prometheus::Registry;
use rust_decimal::Decimal;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orp_flow_exchange_gateway::{
    Config, ExchangeClient, ExchangeRegistry, MarketOrder, OrderbookCache, PaperExchange,
};

/// Application state shared with the HTTP handlers
struct AppState {
    exchanges: Arc<ExchangeRegistry>,
    metrics: Registry,
    config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Arc::new(Config::load()?);

    // Initialize logging
    tracing_subscriber::registry()
        .with(config.log_json.then(|| fmt::layer().json()))
        .with((!config.log_json).then(|| fmt::layer().pretty()))
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting ORPflow Exchange Gateway");
    info!(exchange = %config.exchange_name, symbols = ?config.symbols, "Configuration loaded");

    let metrics = Registry::new();

    // Paper exchange with a small book per configured market
    let paper = Arc::new(PaperExchange::default());
    for symbol in &config.symbols {
        let (bids, asks) = seed_levels(Decimal::from(100));
        paper.seed_book(symbol, bids, asks).await;
    }
    paper.set_balance("USDT", Decimal::from(100_000)).await;

    let client = ExchangeClient::new(
        config.exchange_name.clone(),
        paper,
        OrderbookCache::in_memory(),
        config.reconciler()?,
        &metrics,
    )?;

    let mut exchanges = ExchangeRegistry::new();
    exchanges.insert(client)?;
    let exchanges = Arc::new(exchanges);

    let shutdown = CancellationToken::new();
    exchanges.start_all(&shutdown).await;

    let state = Arc::new(AppState {
        exchanges: exchanges.clone(),
        metrics,
        config: config.clone(),
    });

    // Start health check server
    let health_state = state.clone();
    let health_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_shutdown).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Periodic orderbook status logging
    let status_exchanges = exchanges.clone();
    let status_shutdown = shutdown.clone();
    let status_period = Duration::from_secs(config.status_log_interval_secs.max(1));
    tokio::spawn(async move {
        let mut status_interval = interval(status_period);
        loop {
            tokio::select! {
                _ = status_shutdown.cancelled() => break,
                _ = status_interval.tick() => log_book_status(&status_exchanges).await,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    exchanges.shutdown_all().await;
    if let Err(e) = server.await {
        warn!(error = %e, "Health server task failed");
    }

    info!("Exchange gateway stopped");
    Ok(())
}

/// Five levels per side around `mid`
fn seed_levels(mid: Decimal) -> (Vec<MarketOrder>, Vec<MarketOrder>) {
    let bids = (1..=5)
        .map(|i| MarketOrder::new(mid - Decimal::from(i), Decimal::from(i)))
        .collect();
    let asks = (1..=5)
        .map(|i| MarketOrder::new(mid + Decimal::from(i), Decimal::from(i)))
        .collect();
    (bids, asks)
}

async fn log_book_status(exchanges: &ExchangeRegistry) {
    for client in exchanges.clients() {
        for symbol in client.cache().symbols().await {
            let Ok(record) = client.orderbook(&symbol).await else {
                continue;
            };
            let book = record.metrics();
            if let Some(mid) = book.mid_price {
                info!(
                    exchange = %client.name(),
                    symbol = %symbol,
                    mid_price = %mid,
                    spread_bps = ?book.spread_bps,
                    imbalance = ?book.imbalance,
                    healthy = book.is_healthy(),
                    "Order book status"
                );
            }
        }
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut open_orders = 0;
    for client in state.exchanges.clients() {
        open_orders += client.store().open_count().await;
    }

    Json(serde_json::json!({
        "status": "healthy",
        "component": "exchange-gateway",
        "exchange": state.config.exchange_name,
        "open_orders": open_orders,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, (StatusCode, String)> {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
