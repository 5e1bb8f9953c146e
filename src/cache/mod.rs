//! Multi-tier response cache: TTL + LRU memory tier, manifest-backed disk
//! tier, and a hybrid composition with promotion.
//!
//! The cache stores opaque response bytes keyed by [`CacheKey`]. Decoding
//! happens in the engine on read; the tiers never interpret payloads.

mod disk;
mod hybrid;
mod memory;

pub use disk::DiskCache;
pub use hybrid::HybridCache;
pub use memory::MemoryCache;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime};
use url::Url;

/// Identity of a cacheable request: URL, method, and a hash of the body
/// bytes. Two requests with identical bytes-to-send collide; differing bodies
/// do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    url: String,
    method: String,
    body_hash: u64,
}

impl CacheKey {
    /// Builds a key from the request's wire identity.
    pub fn new(url: &Url, method: &Method, body: Option<&[u8]>) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        body.unwrap_or_default().hash(&mut hasher);
        Self {
            url: url.to_string(),
            method: method.to_string(),
            body_hash: hasher.finish(),
        }
    }

    /// A stable string form used as the disk-manifest key.
    pub fn storage_key(&self) -> String {
        format!("{} {}#{:016x}", self.method, self.url, self.body_hash)
    }
}

/// A cached response: bytes plus freshness and validator metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached response bytes.
    pub bytes: Bytes,
    /// When the entry was created.
    pub created_at: SystemTime,
    /// Time-to-live; `None` means the entry never expires.
    pub ttl: Option<Duration>,
    /// Strong validator from the origin response, when present.
    pub etag: Option<String>,
    /// Weak validator from the origin response, when present.
    pub last_modified: Option<String>,
}

impl CacheEntry {
    /// Creates a fresh entry.
    pub fn new(bytes: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            bytes,
            created_at: SystemTime::now(),
            ttl,
            etag: None,
            last_modified: None,
        }
    }

    /// Returns `true` once the TTL has elapsed. Entries without a TTL never
    /// expire.
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => match self.created_at.elapsed() {
                Ok(age) => age > ttl,
                // Clock moved backwards; treat as fresh.
                Err(_) => false,
            },
            None => false,
        }
    }

    /// The entry's size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The contract shared by all cache tiers.
///
/// Reads never return expired bytes; writes are atomic (an entry is either
/// fully installed or absent); after every call returns, the tier's total
/// bytes are within its configured cap.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the bytes for `key`, touching LRU recency. Expired entries are
    /// evicted and reported as a miss.
    async fn get(&self, key: &CacheKey) -> Option<Bytes>;

    /// Returns the full entry for `key`, including freshness metadata.
    async fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Installs `bytes` under `key`, evicting as needed to stay within the
    /// size cap.
    ///
    /// # Errors
    ///
    /// [`crate::Error::CacheWriteFailed`] when the entry cannot fit even after
    /// a full drain.
    async fn put(&self, key: CacheKey, bytes: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Removes the entry for `key`, if present.
    async fn remove(&self, key: &CacheKey);

    /// Removes all entries.
    async fn clear(&self);

    /// Returns `true` if a non-expired entry exists for `key`.
    async fn contains(&self, key: &CacheKey) -> bool;

    /// Total stored bytes.
    async fn size(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_requests_collide() {
        let url = Url::parse("https://api.example.com/users").unwrap();
        let a = CacheKey::new(&url, &Method::GET, None);
        let b = CacheKey::new(&url, &Method::GET, None);
        assert_eq!(a, b);
        assert_eq!(a.storage_key(), b.storage_key());
    }

    #[test]
    fn differing_bodies_do_not_collide() {
        let url = Url::parse("https://api.example.com/users").unwrap();
        let a = CacheKey::new(&url, &Method::POST, Some(b"one"));
        let b = CacheKey::new(&url, &Method::POST, Some(b"two"));
        assert_ne!(a, b);
    }

    #[test]
    fn differing_methods_do_not_collide() {
        let url = Url::parse("https://api.example.com/users").unwrap();
        let a = CacheKey::new(&url, &Method::GET, None);
        let b = CacheKey::new(&url, &Method::HEAD, None);
        assert_ne!(a, b);
    }

    #[test]
    fn entries_without_ttl_never_expire() {
        let entry = CacheEntry::new(Bytes::from_static(b"x"), None);
        assert!(!entry.is_expired());
    }

    #[test]
    fn elapsed_ttl_expires() {
        let mut entry = CacheEntry::new(Bytes::from_static(b"x"), Some(Duration::from_secs(10)));
        entry.created_at = SystemTime::now() - Duration::from_secs(11);
        assert!(entry.is_expired());
    }
}
