//! Orderbook cache
//!
//! Stores one [`MarketRecord`] per canonical symbol in a pluggable
//! [`KeyValueStore`]. Records are encoded as MessagePack so that every
//! update is a single `set` of the whole snapshot: readers see either the
//! previous snapshot or the new one, never a merge.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{KeyValueStore, MemoryStore, StorageError};
use super::{MarketOrder, MarketRecord};
use crate::symbol::normalize_symbol;

const KEY_PREFIX: &str = "orderbook:";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No orderbook for symbol: {0}")]
    NotFound(String),

    #[error("Orderbook codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Latest bid/ask snapshot per market
#[derive(Clone)]
pub struct OrderbookCache {
    backend: Arc<dyn KeyValueStore>,
    /// Symbols written through this cache, shared by clones
    written: Arc<RwLock<BTreeSet<String>>>,
}

impl OrderbookCache {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            written: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    /// Cache backed by an in-process map
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Replace the snapshot for `symbol`.
    pub async fn update(
        &self,
        symbol: &str,
        bids: Vec<MarketOrder>,
        asks: Vec<MarketOrder>,
    ) -> Result<MarketRecord, CacheError> {
        let symbol = normalize_symbol(symbol);
        let record = MarketRecord {
            symbol: symbol.clone(),
            timestamp: Utc::now(),
            bids,
            asks,
        };

        let encoded = rmp_serde::to_vec_named(&record)
            .map_err(|e| CacheError::Codec(format!("Failed to encode {}: {}", symbol, e)))?;
        self.backend.set(&key(&symbol), Bytes::from(encoded)).await?;
        self.written.write().await.insert(symbol.clone());

        debug!(
            symbol = %symbol,
            bids = record.bids.len(),
            asks = record.asks.len(),
            "Orderbook snapshot stored"
        );

        Ok(record)
    }

    /// Latest snapshot for `symbol`, in any casing or separator style.
    pub async fn get(&self, symbol: &str) -> Result<MarketRecord, CacheError> {
        let symbol = normalize_symbol(symbol);
        let raw = self
            .backend
            .get(&key(&symbol))
            .await?
            .ok_or_else(|| CacheError::NotFound(symbol.clone()))?;

        rmp_serde::from_slice(&raw)
            .map_err(|e| CacheError::Codec(format!("Failed to decode {}: {}", symbol, e)))
    }

    /// Symbols updated through this cache, sorted.
    pub async fn symbols(&self) -> Vec<String> {
        self.written.read().await.iter().cloned().collect()
    }
}

impl std::fmt::Debug for OrderbookCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderbookCache").finish_non_exhaustive()
    }
}

fn key(symbol: &str) -> String {
    format!("{}{}", KEY_PREFIX, symbol)
}
