//! Hybrid cache tier: memory in front of disk, with promotion on disk hits.

use super::{Cache, CacheEntry, CacheKey, DiskCache, MemoryCache};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A two-tier cache: reads hit memory first and fall back to disk, promoting
/// disk hits back into memory; writes go through to both tiers.
///
/// Promotion preserves the entry's original creation time and TTL, so entry
/// age stays observable regardless of which tier served it.
pub struct HybridCache {
    memory: MemoryCache,
    disk: DiskCache,
}

impl HybridCache {
    /// Composes the two tiers.
    pub fn new(memory: MemoryCache, disk: DiskCache) -> Self {
        Self { memory, disk }
    }
}

#[async_trait]
impl Cache for HybridCache {
    async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        self.get_entry(key).await.map(|e| e.bytes)
    }

    async fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.get_entry(key).await {
            return Some(entry);
        }
        let entry = self.disk.get_entry(key).await?;
        if let Err(e) = self.memory.insert_entry(key.clone(), entry.clone()) {
            tracing::debug!(error = %e, "disk hit too large to promote into memory");
        }
        Some(entry)
    }

    async fn put(&self, key: CacheKey, bytes: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.disk.put(key.clone(), bytes.clone(), ttl).await?;
        match self.memory.put(key, bytes, ttl).await {
            Ok(()) => Ok(()),
            // The disk tier holds it; an entry over the memory cap is not a
            // write failure for the composite.
            Err(Error::CacheWriteFailed(reason)) => {
                tracing::debug!(%reason, "entry written to disk only");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, key: &CacheKey) {
        self.memory.remove(key).await;
        self.disk.remove(key).await;
    }

    async fn clear(&self) {
        self.memory.clear().await;
        self.disk.clear().await;
    }

    async fn contains(&self, key: &CacheKey) -> bool {
        self.memory.contains(key).await || self.disk.contains(key).await
    }

    async fn size(&self) -> u64 {
        self.memory.size().await + self.disk.size().await
    }
}
