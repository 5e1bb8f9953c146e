//! Durable offline queue for requests made while unreachable.
//!
//! Entries drain in `(priority desc, created_at asc)` order; ties keep FIFO
//! order. The queue re-serializes to disk after every mutation, and a corrupt
//! file at startup is replaced by an empty queue.

use crate::engine::Engine;
use crate::response::RawResponse;
use crate::{Error, Result};
use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

/// Default per-entry retry budget during a drain.
pub const DEFAULT_ENTRY_RETRY_CAP: u32 = 3;

/// A request captured for later replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Stable identity, kept across re-enqueues.
    pub id: Uuid,
    /// The absolute request URL.
    pub url: String,
    /// The HTTP method name.
    pub method: String,
    /// Headers to replay, as name/value pairs.
    pub headers: Vec<(String, String)>,
    /// The encoded body bytes, when present.
    pub body: Option<Vec<u8>>,
    /// Drain priority; higher drains first.
    pub priority: i32,
    /// Creation time, epoch milliseconds.
    pub created_at_epoch_ms: u64,
    /// Expiry time, epoch milliseconds; expired entries are never replayed.
    pub expires_at_epoch_ms: Option<u64>,
    /// Failed replay attempts so far.
    pub retry_count: u32,
    /// Rendering of the most recent replay failure.
    pub last_error: Option<String>,
}

fn epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

impl QueuedRequest {
    /// Captures a request for later replay.
    pub fn new(
        url: &Url,
        method: &Method,
        headers: &HeaderMap,
        body: Option<Bytes>,
        priority: i32,
    ) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            method: method.to_string(),
            headers,
            body: body.map(|b| b.to_vec()),
            priority,
            created_at_epoch_ms: epoch_ms(SystemTime::now()),
            expires_at_epoch_ms: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Sets a time-to-live from now.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at_epoch_ms = Some(epoch_ms(SystemTime::now() + ttl));
        self
    }

    /// Returns `true` once the expiry time has passed.
    pub fn is_expired(&self) -> bool {
        match self.expires_at_epoch_ms {
            Some(expires) => epoch_ms(SystemTime::now()) > expires,
            None => false,
        }
    }
}

struct QueueInner {
    entries: Vec<QueuedRequest>,
    processing: bool,
}

impl QueueInner {
    fn sort(&mut self) {
        // Stable sort: equal (priority, created_at) keep FIFO order.
        self.entries
            .sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at_epoch_ms.cmp(&b.created_at_epoch_ms))
            });
    }

    fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.is_expired());
        before - self.entries.len()
    }
}

/// A durable priority queue of requests awaiting connectivity.
///
/// # Examples
///
/// ```no_run
/// use caravel::queue::{OfflineQueue, QueuedRequest};
/// use http::{HeaderMap, Method};
/// use url::Url;
///
/// # async fn example() -> Result<(), caravel::Error> {
/// let queue = OfflineQueue::open("/var/lib/app/queue.json", 100).await?;
/// let url = Url::parse("https://api.example.com/events")?;
/// let entry = QueuedRequest::new(&url, &Method::POST, &HeaderMap::new(), None, 1);
/// queue.enqueue(entry).await?;
/// # Ok(())
/// # }
/// ```
pub struct OfflineQueue {
    path: PathBuf,
    max_size: usize,
    entry_retry_cap: u32,
    inner: Mutex<QueueInner>,
}

impl OfflineQueue {
    /// Opens the queue persisted at `path`, bounded to `max_size` entries.
    ///
    /// A missing file starts empty; a corrupt file is replaced by an empty
    /// queue and logged.
    pub async fn open(path: impl AsRef<Path>, max_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<QueuedRequest>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "corrupt queue file, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        let mut inner = QueueInner {
            entries,
            processing: false,
        };
        inner.sort();
        Ok(Self {
            path,
            max_size,
            entry_retry_cap: DEFAULT_ENTRY_RETRY_CAP,
            inner: Mutex::new(inner),
        })
    }

    /// Overrides the per-entry replay budget (default 3).
    pub fn with_entry_retry_cap(mut self, cap: u32) -> Self {
        self.entry_retry_cap = cap;
        self
    }

    async fn persist(&self, inner: &QueueInner) -> Result<()> {
        let json = serde_json::to_vec_pretty(&inner.entries)
            .map_err(|e| Error::Unknown(format!("cannot serialize queue: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::Unknown(format!("cannot persist queue: {}", e)))
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// [`Error::OfflineQueueFull`] when the queue is at capacity.
    pub async fn enqueue(&self, entry: QueuedRequest) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.entries.len() >= self.max_size {
            return Err(Error::OfflineQueueFull {
                capacity: self.max_size,
            });
        }
        tracing::debug!(id = %entry.id, priority = entry.priority, "request queued for replay");
        inner.entries.push(entry);
        inner.sort();
        self.persist(&inner).await
    }

    /// Puts a just-dequeued entry back for another replay round. Bypasses the
    /// capacity check: the drain freed the slot it refills.
    async fn requeue(&self, entry: QueuedRequest) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.push(entry);
        inner.sort();
        self.persist(&inner).await
    }

    /// Removes and returns the highest-priority non-expired entry.
    pub async fn dequeue(&self) -> Result<Option<QueuedRequest>> {
        let mut inner = self.inner.lock().await;
        let dropped = inner.prune_expired();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped expired queue entries");
        }
        let entry = if inner.entries.is_empty() {
            None
        } else {
            Some(inner.entries.remove(0))
        };
        if entry.is_some() || dropped > 0 {
            self.persist(&inner).await?;
        }
        Ok(entry)
    }

    /// Returns the next entry without removing it.
    pub async fn peek(&self) -> Option<QueuedRequest> {
        let inner = self.inner.lock().await;
        inner.entries.iter().find(|e| !e.is_expired()).cloned()
    }

    /// Removes the entry with the given id, if present.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.retain(|e| e.id != id);
        self.persist(&inner).await
    }

    /// Removes all entries.
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        self.persist(&inner).await
    }

    /// Returns all non-expired entries in drain order.
    pub async fn get_all(&self) -> Vec<QueuedRequest> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .filter(|e| !e.is_expired())
            .cloned()
            .collect()
    }

    /// Number of entries currently held, expired included.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Returns `true` when no entries are held.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Drains the queue through `engine`, reporting each outcome.
    ///
    /// Only one drain runs at a time; a re-entrant call returns immediately.
    /// Failed entries are re-enqueued until their retry budget is spent or
    /// they expire, then dropped with the failure reported.
    pub async fn process_queue<F>(&self, engine: &Engine, mut on_result: F) -> Result<()>
    where
        F: FnMut(&QueuedRequest, &Result<RawResponse>),
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.processing {
                tracing::debug!("queue drain already in progress");
                return Ok(());
            }
            inner.processing = true;
        }

        let result = self.drain(engine, &mut on_result).await;
        self.inner.lock().await.processing = false;
        result
    }

    async fn drain<F>(&self, engine: &Engine, on_result: &mut F) -> Result<()>
    where
        F: FnMut(&QueuedRequest, &Result<RawResponse>),
    {
        while let Some(mut entry) = self.dequeue().await? {
            let outcome = engine.replay_queued(&entry).await;
            match outcome {
                Ok(_) => {
                    tracing::info!(id = %entry.id, "queued request replayed");
                    on_result(&entry, &outcome);
                }
                Err(ref e) => {
                    entry.retry_count += 1;
                    entry.last_error = Some(e.to_string());
                    if entry.retry_count < self.entry_retry_cap && !entry.is_expired() {
                        tracing::warn!(
                            id = %entry.id,
                            retry_count = entry.retry_count,
                            error = %e,
                            "queued request failed, will retry"
                        );
                        self.requeue(entry).await?;
                    } else {
                        tracing::warn!(
                            id = %entry.id,
                            retry_count = entry.retry_count,
                            error = %e,
                            "queued request dropped after exhausting retries"
                        );
                        on_result(&entry, &outcome);
                    }
                }
            }
        }
        Ok(())
    }
}
