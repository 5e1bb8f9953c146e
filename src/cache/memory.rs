//! In-memory cache tier: insertion-ordered map with LRU eviction and TTL.

use super::{Cache, CacheEntry, CacheKey};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

struct MemoryInner {
    entries: HashMap<CacheKey, CacheEntry>,
    // Front = least recently used, back = most recently used.
    order: VecDeque<CacheKey>,
    bytes: u64,
}

impl MemoryInner {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(pos).unwrap();
            self.order.push_back(key);
        }
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.bytes -= entry.size();
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        match self.order.pop_front() {
            Some(key) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.bytes -= entry.size();
                    tracing::debug!(key = %key.storage_key(), "evicted least-recently-used entry");
                }
                true
            }
            None => false,
        }
    }
}

/// A size-bounded in-memory cache with LRU eviction and per-entry TTL.
///
/// # Examples
///
/// ```
/// use caravel::cache::{Cache, CacheKey, MemoryCache};
/// use bytes::Bytes;
/// use http::Method;
/// use url::Url;
///
/// # async fn example() -> Result<(), caravel::Error> {
/// let cache = MemoryCache::new(1024 * 1024);
/// let url = Url::parse("https://api.example.com/users/1")?;
/// let key = CacheKey::new(&url, &Method::GET, None);
///
/// cache.put(key.clone(), Bytes::from_static(b"{}"), None).await?;
/// assert!(cache.contains(&key).await);
/// # Ok(())
/// # }
/// ```
pub struct MemoryCache {
    max_size: u64,
    inner: Mutex<MemoryInner>,
}

impl MemoryCache {
    /// Creates a memory cache bounded to `max_size` bytes.
    pub fn new(max_size: u64) -> Self {
        Self {
            max_size,
            inner: Mutex::new(MemoryInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                bytes: 0,
            }),
        }
    }

    /// Installs a pre-built entry, preserving its creation time.
    ///
    /// Used by the hybrid tier when promoting disk hits so that observed
    /// entry age does not reset on promotion.
    pub fn insert_entry(&self, key: CacheKey, entry: CacheEntry) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.remove_entry(&key);
        let new_size = entry.size();
        while inner.bytes + new_size > self.max_size && inner.evict_lru() {}
        if inner.bytes + new_size > self.max_size {
            return Err(Error::CacheWriteFailed(format!(
                "entry of {} bytes exceeds memory cache capacity {}",
                new_size, self.max_size
            )));
        }
        inner.bytes += new_size;
        inner.order.push_back(key.clone());
        inner.entries.insert(key, entry);
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        let expired = inner.entries.get(key)?.is_expired();
        if expired {
            inner.remove_entry(key);
            return None;
        }
        inner.touch(key);
        inner.entries.get(key).map(|e| e.bytes.clone())
    }

    async fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().unwrap();
        let expired = inner.entries.get(key)?.is_expired();
        if expired {
            inner.remove_entry(key);
            return None;
        }
        inner.touch(key);
        inner.entries.get(key).cloned()
    }

    async fn put(&self, key: CacheKey, bytes: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.insert_entry(key, CacheEntry::new(bytes, ttl))
    }

    async fn remove(&self, key: &CacheKey) {
        self.inner.lock().unwrap().remove_entry(key);
    }

    async fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.order.clear();
        inner.bytes = 0;
    }

    async fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    async fn size(&self) -> u64 {
        self.inner.lock().unwrap().bytes
    }
}
