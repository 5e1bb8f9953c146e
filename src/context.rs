//! Per-call context carried through the request pipeline.

use std::collections::{HashMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

/// Tag applied by the sync manager so that a drained request failing again is
/// not pushed back onto the offline queue by the engine.
pub const NO_REQUEUE_TAG: &str = "no-requeue";

/// Context for a single logical call, visible to interceptors.
///
/// The engine creates one context per [`crate::Engine::execute`] invocation
/// and threads it through the interceptor chain, the authenticator, and the
/// retry loop. Interceptors read it; only the engine mutates the retry
/// counter. Cross-cutting state (custom timings, correlation ids) belongs in
/// [`RequestContext::metadata`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id for this logical call.
    pub request_id: Uuid,
    /// When the call entered the engine.
    pub started_at: Instant,
    /// Transport attempts consumed by the retry policy so far.
    pub retry_count: u32,
    /// Free-form tags; see [`NO_REQUEUE_TAG`].
    pub tags: HashSet<String>,
    /// Free-form string metadata for interceptors.
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    /// Creates a fresh context with a new request id.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started_at: Instant::now(),
            retry_count: 0,
            tags: HashSet::new(),
            metadata: HashMap::new(),
        }
    }

    /// Creates a context carrying the given tags.
    pub fn with_tags(tags: impl IntoIterator<Item = String>) -> Self {
        let mut ctx = Self::new();
        ctx.tags.extend(tags);
        ctx
    }

    /// Returns `true` if this call must not be re-enqueued on failure.
    pub fn no_requeue(&self) -> bool {
        self.tags.contains(NO_REQUEUE_TAG)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_get_distinct_ids() {
        assert_ne!(RequestContext::new().request_id, RequestContext::new().request_id);
    }

    #[test]
    fn no_requeue_tag_is_recognized() {
        let ctx = RequestContext::with_tags([NO_REQUEUE_TAG.to_string()]);
        assert!(ctx.no_requeue());
        assert!(!RequestContext::new().no_requeue());
    }
}
