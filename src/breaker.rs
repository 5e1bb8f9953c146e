//! Circuit breaker gating network attempts on sustained failure.
//!
//! The breaker sits in front of the transport: [`CircuitBreaker::should_allow`]
//! is consulted before every attempt (including within retry loops), and the
//! outcome of each attempt is reported back via `record_success` /
//! `record_failure`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally; failures accumulate.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// One probe call is admitted to test recovery.
    HalfOpen,
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays Open before admitting a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the reset timeout.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// A three-state circuit breaker.
///
/// All transitions happen under one short-lived lock, so concurrent callers
/// observe the breaker as if operated from a single thread.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given config.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns the current state, resolving an elapsed Open window to Open
    /// (the transition to HalfOpen happens in [`CircuitBreaker::should_allow`]).
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Asks the breaker whether a network attempt may proceed.
    ///
    /// In Open, once `reset_timeout` has elapsed the breaker transitions to
    /// HalfOpen and admits the caller as the probe. Otherwise the remaining
    /// wait is returned.
    pub fn should_allow(&self) -> Result<(), Duration> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let opened_at = match inner.opened_at {
                    Some(t) => t,
                    None => {
                        // Open without a timestamp cannot block forever.
                        inner.state = CircuitState::HalfOpen;
                        return Ok(());
                    }
                };
                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("circuit half-open, admitting probe");
                    Ok(())
                } else {
                    Err(self.config.reset_timeout - elapsed)
                }
            }
        }
    }

    /// Records a successful attempt.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.opened_at = None;
                tracing::info!("circuit closed after successful probe");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed attempt.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.failure_count,
                        "circuit opened after consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("circuit reopened after failed probe");
            }
            CircuitState::Open => {}
        }
    }

    /// Returns the current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }

    /// Forces the circuit open (admin/testing hook).
    pub fn force_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    /// Forces the circuit closed (admin/testing hook).
    pub fn force_close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow().is_ok());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default().with_failure_threshold(3));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn open_rejects_with_remaining_wait() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::from_secs(60)),
        );
        cb.record_failure();
        let remaining = cb.should_allow().unwrap_err();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(55));
    }

    #[test]
    fn elapsed_reset_admits_probe() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::ZERO),
        );
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.should_allow().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn probe_success_closes_and_resets() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::ZERO),
        );
        cb.record_failure();
        cb.should_allow().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn probe_failure_reopens() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_reset_timeout(Duration::ZERO),
        );
        cb.record_failure();
        cb.should_allow().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_in_closed_resets_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default().with_failure_threshold(3));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn force_hooks() {
        let cb = CircuitBreaker::default();
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.force_close();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
