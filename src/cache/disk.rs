//! Disk cache tier: one opaque-named file per entry plus a JSON manifest.
//!
//! The manifest (`manifest.json`) maps storage keys to file metadata. Data
//! files are written before the manifest is rewritten, so a crash between the
//! two leaves an orphan file that startup reconciliation deletes. Eviction is
//! oldest-created first.

use super::{Cache, CacheEntry, CacheKey};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    filename: String,
    size: u64,
    created_at_epoch_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
}

impl ManifestEntry {
    fn created_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.created_at_epoch_seconds)
    }

    fn is_expired(&self) -> bool {
        match self.ttl_seconds {
            Some(ttl) => match self.created_at().elapsed() {
                Ok(age) => age > Duration::from_secs(ttl),
                Err(_) => false,
            },
            None => false,
        }
    }
}

struct DiskInner {
    manifest: HashMap<String, ManifestEntry>,
    bytes: u64,
}

/// A size-bounded disk cache with a crash-safe JSON manifest.
pub struct DiskCache {
    dir: PathBuf,
    max_size: u64,
    inner: Mutex<DiskInner>,
}

impl DiskCache {
    /// Opens (or creates) a disk cache rooted at `dir`, bounded to `max_size`
    /// bytes.
    ///
    /// Startup reconciliation trusts the file set: expired manifest rows and
    /// rows whose file is missing are purged, and data files not referenced by
    /// the manifest are deleted.
    pub async fn open(dir: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::CacheWriteFailed(format!("cannot create cache dir: {}", e)))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let mut manifest: HashMap<String, ManifestEntry> =
            match tokio::fs::read(&manifest_path).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        tracing::warn!(error = %e, "corrupt cache manifest, starting empty");
                        HashMap::new()
                    }
                },
                Err(_) => HashMap::new(),
            };

        // Drop expired rows and rows whose file vanished.
        let mut keep = HashMap::new();
        for (key, entry) in manifest.drain() {
            let path = dir.join(&entry.filename);
            if entry.is_expired() {
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }
            if tokio::fs::metadata(&path).await.is_ok() {
                keep.insert(key, entry);
            } else {
                tracing::warn!(key = %key, "cache manifest entry lost its file, purging");
            }
        }
        manifest = keep;

        // Delete orphan data files the manifest does not reference.
        let referenced: std::collections::HashSet<&str> =
            manifest.values().map(|e| e.filename.as_str()).collect();
        if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
            while let Ok(Some(dirent)) = entries.next_entry().await {
                let name = dirent.file_name().to_string_lossy().into_owned();
                if name != MANIFEST_FILE && !referenced.contains(name.as_str()) {
                    tracing::debug!(file = %name, "removing orphan cache file");
                    let _ = tokio::fs::remove_file(dirent.path()).await;
                }
            }
        }

        let bytes = manifest.values().map(|e| e.size).sum();
        let cache = Self {
            dir,
            max_size,
            inner: Mutex::new(DiskInner { manifest, bytes }),
        };
        cache.persist_manifest(&*cache.inner.lock().await).await?;
        Ok(cache)
    }

    async fn persist_manifest(&self, inner: &DiskInner) -> Result<()> {
        let json = serde_json::to_vec_pretty(&inner.manifest)
            .map_err(|e| Error::CacheWriteFailed(format!("cannot serialize manifest: {}", e)))?;
        tokio::fs::write(self.dir.join(MANIFEST_FILE), json)
            .await
            .map_err(|e| Error::CacheWriteFailed(format!("cannot write manifest: {}", e)))
    }

    async fn remove_locked(&self, inner: &mut DiskInner, storage_key: &str) {
        if let Some(entry) = inner.manifest.remove(storage_key) {
            inner.bytes -= entry.size;
            let _ = tokio::fs::remove_file(self.dir.join(&entry.filename)).await;
        }
    }

    /// Evicts oldest-created entries until `needed` more bytes fit.
    async fn evict_for(&self, inner: &mut DiskInner, needed: u64) {
        while inner.bytes + needed > self.max_size {
            let oldest = inner
                .manifest
                .iter()
                .min_by_key(|(_, e)| e.created_at_epoch_seconds)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    tracing::debug!(key = %key, "evicting oldest disk cache entry");
                    self.remove_locked(inner, &key).await;
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        self.get_entry(key).await.map(|e| e.bytes)
    }

    async fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let storage_key = key.storage_key();
        let mut inner = self.inner.lock().await;
        let record = inner.manifest.get(&storage_key)?.clone();
        if record.is_expired() {
            self.remove_locked(&mut inner, &storage_key).await;
            let _ = self.persist_manifest(&inner).await;
            return None;
        }
        match tokio::fs::read(self.dir.join(&record.filename)).await {
            Ok(bytes) => Some(CacheEntry {
                bytes: Bytes::from(bytes),
                created_at: record.created_at(),
                ttl: record.ttl_seconds.map(Duration::from_secs),
                etag: record.etag,
                last_modified: record.last_modified,
            }),
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "cache file unreadable, purging");
                self.remove_locked(&mut inner, &storage_key).await;
                let _ = self.persist_manifest(&inner).await;
                None
            }
        }
    }

    async fn put(&self, key: CacheKey, bytes: Bytes, ttl: Option<Duration>) -> Result<()> {
        let storage_key = key.storage_key();
        let size = bytes.len() as u64;
        let mut inner = self.inner.lock().await;

        if size > self.max_size {
            return Err(Error::CacheWriteFailed(format!(
                "entry of {} bytes exceeds disk cache capacity {}",
                size, self.max_size
            )));
        }

        // Data file first; the manifest only ever references complete files.
        let filename = Uuid::new_v4().simple().to_string();
        tokio::fs::write(self.dir.join(&filename), &bytes)
            .await
            .map_err(|e| Error::CacheWriteFailed(format!("cannot write cache file: {}", e)))?;

        self.remove_locked(&mut inner, &storage_key).await;
        self.evict_for(&mut inner, size).await;

        let created_at_epoch_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        inner.manifest.insert(
            storage_key,
            ManifestEntry {
                filename,
                size,
                created_at_epoch_seconds,
                ttl_seconds: ttl.map(|t| t.as_secs()),
                etag: None,
                last_modified: None,
            },
        );
        inner.bytes += size;
        self.persist_manifest(&inner).await
    }

    async fn remove(&self, key: &CacheKey) {
        let mut inner = self.inner.lock().await;
        self.remove_locked(&mut inner, &key.storage_key()).await;
        let _ = self.persist_manifest(&inner).await;
    }

    async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        let keys: Vec<String> = inner.manifest.keys().cloned().collect();
        for key in keys {
            self.remove_locked(&mut inner, &key).await;
        }
        let _ = self.persist_manifest(&inner).await;
    }

    async fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.lock().await;
        inner
            .manifest
            .get(&key.storage_key())
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    async fn size(&self) -> u64 {
        self.inner.lock().await.bytes
    }
}
