//! Tiered response cache wrapping the whole pipeline.
//!
//! Lookup order: memory tier first ([`moka`], bounded, short TTL), then
//! the distributed tier (longer TTL, shared across process instances). A
//! distributed hit is written back into the memory tier before
//! returning. Distributed-tier unavailability degrades silently to
//! memory-only operation — a cache problem must never turn a miss into a
//! query failure.

pub mod fingerprint;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::types::SearchResponse;

pub use fingerprint::{fingerprint, Fingerprint};

/// Which tier served a cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Distributed,
}

/// The distributed tier's logical contract (Redis or equivalent).
///
/// Implementations live with the embedding application; values are
/// opaque serialized strings. Every method may fail — the tiered cache
/// treats failures as misses and logs them.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn invalidate(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Two-tier response cache keyed by query fingerprint.
pub struct TieredCache {
    memory: Cache<Fingerprint, SearchResponse>,
    distributed: Option<Arc<dyn DistributedCache>>,
    distributed_ttl: Duration,
}

impl TieredCache {
    /// Memory-only cache.
    pub fn new(config: &CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Cache with both tiers.
    pub fn with_distributed(config: &CacheConfig, distributed: Arc<dyn DistributedCache>) -> Self {
        Self::build(config, Some(distributed))
    }

    fn build(config: &CacheConfig, distributed: Option<Arc<dyn DistributedCache>>) -> Self {
        Self {
            memory: Cache::builder()
                .max_capacity(config.memory_capacity)
                .time_to_live(Duration::from_secs(config.memory_ttl_secs))
                .build(),
            distributed,
            distributed_ttl: Duration::from_secs(config.distributed_ttl_secs),
        }
    }

    /// Look up a response. A distributed hit refreshes the memory tier
    /// so the fingerprint never maps to two different live values across
    /// tiers.
    pub async fn get(&self, key: &Fingerprint) -> Option<(SearchResponse, CacheTier)> {
        if let Some(response) = self.memory.get(key).await {
            tracing::trace!(fingerprint = %key, "memory tier hit");
            return Some((response, CacheTier::Memory));
        }

        let distributed = self.distributed.as_ref()?;
        match distributed.get(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str::<SearchResponse>(&raw) {
                Ok(response) => {
                    tracing::trace!(fingerprint = %key, "distributed tier hit");
                    self.memory.insert(key.clone(), response.clone()).await;
                    Some((response, CacheTier::Distributed))
                }
                Err(err) => {
                    tracing::warn!(fingerprint = %key, error = %err, "corrupt distributed cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(fingerprint = %key, error = %err, "distributed tier unavailable");
                None
            }
        }
    }

    /// Store a response in both tiers. Distributed-tier failures are
    /// logged and swallowed.
    pub async fn set(&self, key: &Fingerprint, response: &SearchResponse) {
        self.memory.insert(key.clone(), response.clone()).await;

        let Some(distributed) = self.distributed.as_ref() else {
            return;
        };
        match serde_json::to_string(response) {
            Ok(raw) => {
                if let Err(err) = distributed.set(key.as_str(), &raw, self.distributed_ttl).await {
                    tracing::warn!(fingerprint = %key, error = %err, "distributed tier write failed");
                }
            }
            Err(err) => {
                tracing::warn!(fingerprint = %key, error = %err, "response serialisation failed");
            }
        }
    }

    /// Drop one entry from both tiers.
    pub async fn invalidate(&self, key: &Fingerprint) {
        self.memory.invalidate(key).await;
        if let Some(distributed) = self.distributed.as_ref() {
            if let Err(err) = distributed.invalidate(key.as_str()).await {
                tracing::warn!(fingerprint = %key, error = %err, "distributed invalidation failed");
            }
        }
    }

    /// Drop everything from both tiers.
    pub async fn clear(&self) {
        self.memory.invalidate_all();
        if let Some(distributed) = self.distributed.as_ref() {
            if let Err(err) = distributed.clear().await {
                tracing::warn!(error = %err, "distributed clear failed");
            }
        }
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("memory_entries", &self.memory.entry_count())
            .field("has_distributed", &self.distributed.is_some())
            .finish()
    }
}
