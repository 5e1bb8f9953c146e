//! Background synchronization of the offline queue.
//!
//! The sync manager watches reachability and drains the offline queue when
//! connectivity returns. A `syncing` guard coalesces re-entrant triggers, and
//! every replayed call is tagged `no-requeue` (via the engine's replay path)
//! so failures cannot cycle back into the queue.

use crate::engine::Engine;
use crate::queue::OfflineQueue;
use crate::reachability::Reachability;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// What the sync manager is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync in progress.
    Idle,
    /// A drain is running.
    Syncing,
}

/// Outcome of one completed sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries replayed successfully.
    pub replayed: usize,
    /// Entries dropped after exhausting their retry budget.
    pub dropped: usize,
}

/// Drives the offline queue when connectivity returns.
///
/// # Examples
///
/// ```no_run
/// use caravel::sync::SyncManager;
/// # use std::sync::Arc;
/// # async fn example(engine: Arc<caravel::Engine>, queue: Arc<caravel::queue::OfflineQueue>, reachability: Arc<caravel::reachability::Reachability>) {
/// let sync = SyncManager::new(engine, queue, reachability);
/// sync.start();
/// // ... later, or from a manual refresh action:
/// if let Some(report) = sync.sync_now().await.unwrap() {
///     println!("replayed {} requests", report.replayed);
/// }
/// # }
/// ```
pub struct SyncManager {
    engine: Arc<Engine>,
    queue: Arc<OfflineQueue>,
    reachability: Arc<Reachability>,
    auto_sync: bool,
    syncing: AtomicBool,
    subscription: Mutex<Option<Uuid>>,
}

impl SyncManager {
    /// Creates a manager with auto-sync enabled.
    pub fn new(
        engine: Arc<Engine>,
        queue: Arc<OfflineQueue>,
        reachability: Arc<Reachability>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            queue,
            reachability,
            auto_sync: true,
            syncing: AtomicBool::new(false),
            subscription: Mutex::new(None),
        })
    }

    /// Creates a manager that only syncs on explicit [`SyncManager::sync_now`]
    /// calls.
    pub fn manual(
        engine: Arc<Engine>,
        queue: Arc<OfflineQueue>,
        reachability: Arc<Reachability>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            queue,
            reachability,
            auto_sync: false,
            syncing: AtomicBool::new(false),
            subscription: Mutex::new(None),
        })
    }

    /// Subscribes to reachability; offline-to-online transitions trigger a
    /// sync when auto-sync is enabled. Calling `start` twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut subscription = self.subscription.lock().unwrap();
        if subscription.is_some() {
            return;
        }
        let manager = Arc::downgrade(self);
        let id = self.reachability.subscribe(move |previous, current| {
            if previous.is_reachable() || !current.is_reachable() {
                return;
            }
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if !manager.auto_sync {
                return;
            }
            tracing::info!("connectivity restored, draining offline queue");
            tokio::spawn(async move {
                if let Err(e) = manager.sync_now().await {
                    tracing::warn!(error = %e, "background sync failed");
                }
            });
        });
        *subscription = Some(id);
    }

    /// Stops reacting to reachability changes.
    pub fn stop(&self) {
        if let Some(id) = self.subscription.lock().unwrap().take() {
            self.reachability.unsubscribe(id);
        }
    }

    /// Returns the current state.
    pub fn status(&self) -> SyncState {
        if self.syncing.load(Ordering::SeqCst) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Drains the queue once.
    ///
    /// Returns `Ok(None)` when a sync was already running (the trigger is
    /// coalesced into it). Entries that fail are left to the queue's retry
    /// accounting; nothing is re-enqueued by the engine during a sync.
    pub async fn sync_now(&self) -> Result<Option<SyncReport>> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("sync already in progress, coalescing trigger");
            return Ok(None);
        }

        let report = Mutex::new(SyncReport::default());
        let result = self
            .queue
            .process_queue(&self.engine, |_, outcome| {
                let mut report = report.lock().unwrap();
                match outcome {
                    Ok(_) => report.replayed += 1,
                    Err(_) => report.dropped += 1,
                }
            })
            .await;
        self.syncing.store(false, Ordering::SeqCst);

        let report = report.into_inner().unwrap();
        match result {
            Ok(()) => {
                tracing::info!(
                    replayed = report.replayed,
                    dropped = report.dropped,
                    "sync pass complete"
                );
                Ok(Some(report))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::Status;

    #[tokio::test]
    async fn status_is_idle_before_any_sync() {
        let engine = Arc::new(crate::Engine::builder().build().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(
            OfflineQueue::open(dir.path().join("queue.json"), 10)
                .await
                .unwrap(),
        );
        let reachability = Arc::new(Reachability::new());
        let sync = SyncManager::new(engine, queue, reachability);
        assert_eq!(sync.status(), SyncState::Idle);
    }

    #[tokio::test]
    async fn empty_queue_syncs_to_empty_report() {
        let engine = Arc::new(crate::Engine::builder().build().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(
            OfflineQueue::open(dir.path().join("queue.json"), 10)
                .await
                .unwrap(),
        );
        let reachability = Arc::new(Reachability::new());
        let sync = SyncManager::new(engine, queue, reachability);

        let report = sync.sync_now().await.unwrap().unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(sync.status(), SyncState::Idle);
    }

    #[tokio::test]
    async fn stop_unsubscribes() {
        let engine = Arc::new(crate::Engine::builder().build().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(
            OfflineQueue::open(dir.path().join("queue.json"), 10)
                .await
                .unwrap(),
        );
        let reachability = Arc::new(Reachability::new());
        let sync = SyncManager::new(engine, queue.clone(), reachability.clone());
        sync.start();
        sync.stop();

        // With the subscription gone this transition must not panic or spawn.
        reachability.set_status(Status::NotReachable);
        reachability.set_status(Status::ViaWifi);
    }
}
