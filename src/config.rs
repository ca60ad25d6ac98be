//! Configuration module for the exchange gateway

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::reconciler::ReconcilerConfig;
use crate::symbol::normalize_symbol;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of the exchange instance
    pub exchange_name: String,

    /// Markets whose orderbook is always refreshed (canonical form)
    pub symbols: Vec<String>,

    /// Reconciler intervals
    pub order_refresh_interval_ms: u64,
    pub orderbook_refresh_interval_ms: u64,

    /// Maximum concurrent remote requests per tick
    pub max_concurrent_fetches: usize,

    /// Port of the health/metrics HTTP server
    pub health_port: u16,

    /// Orderbook status log interval in seconds
    pub status_log_interval_secs: u64,

    /// JSON logs instead of human readable ones
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let symbols = parse_symbols(
            &env::var("SYMBOLS").unwrap_or_else(|_| "BTC/USDT,ETH/USDT".to_string()),
        );

        Ok(Self {
            exchange_name: env::var("EXCHANGE_NAME").unwrap_or_else(|_| "paper".to_string()),
            symbols,
            order_refresh_interval_ms: env::var("ORDER_REFRESH_INTERVAL_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            orderbook_refresh_interval_ms: env::var("ORDERBOOK_REFRESH_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            max_concurrent_fetches: env::var("MAX_CONCURRENT_FETCHES")
                .unwrap_or_else(|_| "8".to_string())
                .parse::<usize>()
                .unwrap_or(8)
                .max(1),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .unwrap_or(9090),
            status_log_interval_secs: env::var("STATUS_LOG_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            log_json: env::var("LOG_JSON")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(true),
        })
    }

    /// Reconciler settings derived from this configuration.
    pub fn reconciler(&self) -> Result<ReconcilerConfig> {
        if self.order_refresh_interval_ms == 0 || self.orderbook_refresh_interval_ms == 0 {
            return Err(GatewayError::Config(
                "Refresh intervals must be greater than zero".to_string(),
            ));
        }
        let config = ReconcilerConfig {
            order_interval: Duration::from_millis(self.order_refresh_interval_ms),
            orderbook_interval: Duration::from_millis(self.orderbook_refresh_interval_ms),
            max_concurrency: self.max_concurrent_fetches,
            symbols: self.symbols.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Split a comma separated list into canonical, de-duplicated symbols.
fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in raw.split(',').map(normalize_symbol) {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange_name: "paper".to_string(),
            symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            order_refresh_interval_ms: 2000,
            orderbook_refresh_interval_ms: 1000,
            max_concurrent_fetches: 8,
            health_port: 9090,
            status_log_interval_secs: 30,
            log_json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        assert_eq!(
            parse_symbols("btc_usdt, ETH-USDT,,BTC/USDT"),
            vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
        );
    }

    #[test]
    fn test_reconciler_config() {
        let config = Config::default().reconciler().unwrap();
        assert_eq!(config.order_interval, Duration::from_secs(2));
        assert_eq!(config.orderbook_interval, Duration::from_secs(1));
        assert_eq!(config.max_concurrency, 8);

        let zero = Config {
            orderbook_refresh_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(zero.reconciler(), Err(GatewayError::Config(_))));
    }
}
