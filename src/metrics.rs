//! Per-engine call counters and consistent snapshots.

use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    total_duration: Duration,
    total_bytes: u64,
}

/// Thread-safe call counters.
///
/// All fields move together under one lock, so a [`Metrics::snapshot`] is a
/// point-in-time view rather than a mix of counters from different calls.
#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<Counters>,
}

impl Metrics {
    /// Creates zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful call.
    pub fn record_success(&self, duration: Duration, bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.total += 1;
        inner.successful += 1;
        inner.total_duration += duration;
        inner.total_bytes += bytes;
    }

    /// Records a failed call.
    pub fn record_failure(&self, duration: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.total += 1;
        inner.failed += 1;
        inner.total_duration += duration;
    }

    /// Returns a consistent copy of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap().clone();
        MetricsSnapshot {
            total: inner.total,
            successful: inner.successful,
            failed: inner.failed,
            average_duration: if inner.total > 0 {
                inner.total_duration / inner.total as u32
            } else {
                Duration::ZERO
            },
            total_bytes: inner.total_bytes,
            success_rate: if inner.total > 0 {
                inner.successful as f64 / inner.total as f64
            } else {
                0.0
            },
        }
    }
}

/// A point-in-time copy of engine metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Calls attempted.
    pub total: u64,
    /// Calls that returned a decoded response.
    pub successful: u64,
    /// Calls that returned an error.
    pub failed: u64,
    /// Mean call latency.
    pub average_duration: Duration,
    /// Response bytes received across successful calls.
    pub total_bytes: u64,
    /// `successful / total`, or 0 when nothing ran.
    pub success_rate: f64,
}
