//! Named exchange instances

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::ExchangeClient;
use crate::error::{GatewayError, Result};

/// Explicit map of exchange clients by name
#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    clients: BTreeMap<String, Arc<ExchangeClient>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client; names must be unique.
    pub fn insert(&mut self, client: ExchangeClient) -> Result<Arc<ExchangeClient>> {
        let name = client.name().to_string();
        if self.clients.contains_key(&name) {
            return Err(GatewayError::Config(format!(
                "Exchange {} is already registered",
                name
            )));
        }
        let client = Arc::new(client);
        self.clients.insert(name, client.clone());
        Ok(client)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExchangeClient>> {
        self.clients.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Arc<ExchangeClient>> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Start every reconciler under `token`.
    pub async fn start_all(&self, token: &CancellationToken) {
        for client in self.clients.values() {
            client.start_with(token.clone()).await;
        }
        info!(exchanges = self.clients.len(), "All exchange clients started");
    }

    /// Stop every reconciler and wait for them.
    pub async fn shutdown_all(&self) {
        for client in self.clients.values() {
            client.shutdown().await;
        }
        info!("All exchange clients stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::OrderbookCache;
    use crate::reconciler::ReconcilerConfig;
    use crate::remote::PaperExchange;
    use prometheus::Registry;

    fn paper_client(name: &str, registry: &Registry) -> ExchangeClient {
        ExchangeClient::new(
            name,
            Arc::new(PaperExchange::default()),
            OrderbookCache::in_memory(),
            ReconcilerConfig::default(),
            registry,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let metrics = Registry::new();
        let mut registry = ExchangeRegistry::new();
        registry.insert(paper_client("beta", &metrics)).unwrap();
        registry.insert(paper_client("alpha", &metrics)).unwrap();
        assert_eq!(registry.names(), vec!["alpha", "beta"]);

        // A separate metrics registry so only the name clash is tested.
        let dup = paper_client("alpha", &Registry::new());
        assert!(matches!(registry.insert(dup), Err(GatewayError::Config(_))));

        let token = CancellationToken::new();
        registry.start_all(&token).await;
        assert!(registry.get("alpha").unwrap().is_running().await);

        registry.shutdown_all().await;
        for client in registry.clients() {
            assert!(!client.is_running().await);
        }
    }
}
