//! Connectivity status and change notification.
//!
//! The OS notification source is out of scope; platform integrations feed
//! [`Reachability::set_status`] and everything downstream (listeners, the
//! sync manager) reacts to transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Current connectivity, as last reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No report received yet.
    Unknown,
    /// No usable route.
    NotReachable,
    /// Connected over Wi-Fi.
    ViaWifi,
    /// Connected over a cellular network.
    ViaCellular,
}

impl Status {
    /// Returns `true` for Wi-Fi or cellular connectivity.
    pub fn is_reachable(&self) -> bool {
        matches!(self, Status::ViaWifi | Status::ViaCellular)
    }
}

type Listener = Arc<dyn Fn(Status, Status) + Send + Sync>;

struct ReachabilityInner {
    status: Status,
    listeners: HashMap<Uuid, Listener>,
}

/// Connectivity observer with multi-listener registration.
///
/// Listeners receive `(previous, current)` on every status change and are
/// invoked outside the internal lock, so a listener may call back into the
/// observer.
///
/// # Examples
///
/// ```
/// use caravel::reachability::{Reachability, Status};
///
/// let reachability = Reachability::new();
/// let id = reachability.subscribe(|previous, current| {
///     if !previous.is_reachable() && current.is_reachable() {
///         println!("back online");
///     }
/// });
/// reachability.set_status(Status::ViaWifi);
/// reachability.unsubscribe(id);
/// ```
pub struct Reachability {
    inner: Mutex<ReachabilityInner>,
}

impl Reachability {
    /// Creates an observer reporting [`Status::Unknown`].
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReachabilityInner {
                status: Status::Unknown,
                listeners: HashMap::new(),
            }),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> Status {
        self.inner.lock().unwrap().status
    }

    /// Returns `true` when the network is usable.
    pub fn is_reachable(&self) -> bool {
        self.status().is_reachable()
    }

    /// Registers a change listener; returns its subscription id.
    pub fn subscribe(&self, listener: impl Fn(Status, Status) + Send + Sync + 'static) -> Uuid {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .listeners
            .insert(id, Arc::new(listener));
        id
    }

    /// Removes the listener registered under `id`.
    pub fn unsubscribe(&self, id: Uuid) {
        self.inner.lock().unwrap().listeners.remove(&id);
    }

    /// Reports a new status; listeners fire only on actual change.
    pub fn set_status(&self, status: Status) {
        let (previous, listeners): (Status, Vec<Listener>) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.status == status {
                return;
            }
            let previous = inner.status;
            inner.status = status;
            (previous, inner.listeners.values().cloned().collect())
        };
        tracing::info!(?previous, current = ?status, "reachability changed");
        for listener in listeners {
            listener(previous, status);
        }
    }
}

impl Default for Reachability {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reachable_predicate() {
        assert!(Status::ViaWifi.is_reachable());
        assert!(Status::ViaCellular.is_reachable());
        assert!(!Status::NotReachable.is_reachable());
        assert!(!Status::Unknown.is_reachable());
    }

    #[test]
    fn listeners_fire_on_change_only() {
        let reachability = Reachability::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        reachability.subscribe(move |_, _| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        reachability.set_status(Status::ViaWifi);
        reachability.set_status(Status::ViaWifi);
        reachability.set_status(Status::NotReachable);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listeners_see_transition_edges() {
        let reachability = Reachability::new();
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let transitions_clone = transitions.clone();
        reachability.subscribe(move |previous, current| {
            transitions_clone.lock().unwrap().push((previous, current));
        });

        reachability.set_status(Status::NotReachable);
        reachability.set_status(Status::ViaCellular);

        let seen = transitions.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (Status::Unknown, Status::NotReachable),
                (Status::NotReachable, Status::ViaCellular),
            ]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let reachability = Reachability::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let id = reachability.subscribe(move |_, _| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        reachability.unsubscribe(id);
        reachability.set_status(Status::ViaWifi);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
