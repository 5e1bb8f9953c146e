//! Retry decisions and backoff delays for classified failures.
//!
//! The retry controller answers two questions for a classified [`Error`] and a
//! 0-based attempt number: should the engine try again, and after how long.
//! Strategies and jitter are pure functions so the delay grid is testable
//! without sleeping.

use crate::Error;
use rand::Rng;
use std::time::Duration;

/// How the delay between attempts grows.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Retry immediately, no delay.
    Immediate,
    /// A fixed delay between attempts.
    Constant(Duration),
    /// `base * multiplier^attempt`, clamped to the policy's `max_delay`.
    Exponential {
        /// The delay before the first retry.
        base: Duration,
        /// Growth factor per attempt (typically 2.0).
        multiplier: f64,
    },
    /// Custom delay logic over the 0-based attempt number.
    Custom(fn(attempt: u32) -> Duration),
}

impl BackoffStrategy {
    /// The un-jittered delay for the given 0-based attempt.
    pub fn delay(&self, attempt: u32, max_delay: Duration) -> Duration {
        match self {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::Constant(delay) => (*delay).min(max_delay),
            BackoffStrategy::Exponential { base, multiplier } => {
                let seconds = base.as_secs_f64() * multiplier.powi(attempt as i32);
                if !seconds.is_finite() || seconds >= max_delay.as_secs_f64() {
                    max_delay
                } else if seconds <= 0.0 {
                    Duration::ZERO
                } else {
                    Duration::from_secs_f64(seconds)
                }
            }
            BackoffStrategy::Custom(f) => f(attempt).min(max_delay),
        }
    }
}

/// Randomization applied on top of the strategy delay.
///
/// Jitter spreads simultaneous retries apart so a recovering service is not
/// hit by a synchronized wave.
#[derive(Debug, Clone, Copy, Default)]
pub enum Jitter {
    /// Use the computed delay as-is.
    #[default]
    None,
    /// `U[0, d]`.
    Full,
    /// `d/2 + U[0, d/2]`.
    Equal,
    /// `U[d, 3d]`.
    Decorrelated,
}

impl Jitter {
    /// Applies this jitter to a computed delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        let mut rng = rand::thread_rng();
        match self {
            Jitter::None => delay,
            Jitter::Full => delay.mul_f64(rng.gen_range(0.0..=1.0)),
            Jitter::Equal => delay.mul_f64(0.5) + delay.mul_f64(0.5).mul_f64(rng.gen_range(0.0..=1.0)),
            Jitter::Decorrelated => delay.mul_f64(rng.gen_range(1.0..=3.0)),
        }
    }
}

/// Decision and delay policy for retrying classified failures.
///
/// # Examples
///
/// ```
/// use caravel::{BackoffStrategy, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3)
///     .with_strategy(BackoffStrategy::Exponential {
///         base: Duration::from_secs(1),
///         multiplier: 2.0,
///     });
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_attempts: u32,
    /// How delays grow between attempts.
    pub strategy: BackoffStrategy,
    /// Randomization applied to computed delays.
    pub jitter: Jitter,
    /// Hard cap on any single delay.
    pub max_delay: Duration,
    /// Status codes eligible for retry.
    pub retryable_status_codes: Vec<u16>,
    /// Retry calls that timed out.
    pub retry_on_timeout: bool,
    /// Retry calls that failed at the connection layer.
    pub retry_on_connection_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential {
                base: Duration::from_millis(500),
                multiplier: 2.0,
            },
            jitter: Jitter::None,
            max_delay: Duration::from_secs(30),
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connection_error: true,
        }
    }
}

impl RetryPolicy {
    /// A policy retrying up to `max_attempts` times with the default backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Sets the backoff strategy.
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the jitter mode.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the hard delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Replaces the retryable status-code set.
    pub fn with_retryable_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retryable_status_codes = codes;
        self
    }

    /// Decides whether `error` at 0-based `attempt` warrants another try.
    ///
    /// Non-recoverable errors (auth, decode, 4xx other than the retryable
    /// set) never retry. Attempts at or past `max_attempts` never retry.
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.max_attempts && self.retryable_kind(error)
    }

    /// Whether `error` belongs to a kind this policy can recover from,
    /// ignoring the attempt budget. The engine uses this to distinguish
    /// budget exhaustion from terminal failures.
    pub fn retryable_kind(&self, error: &Error) -> bool {
        match error {
            Error::Timeout => self.retry_on_timeout,
            Error::NoConnection
            | Error::DnsFailure(_)
            | Error::ConnectionRefused
            | Error::ConnectionReset
            | Error::SslError(_) => self.retry_on_connection_error,
            Error::RateLimited { .. } => self.retryable_status_codes.contains(&429),
            Error::ServerError { status, .. } | Error::ClientError { status, .. } => {
                self.retryable_status_codes.contains(&status.as_u16())
            }
            _ => false,
        }
    }

    /// The un-jittered delay before retrying after 0-based `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.strategy.delay(attempt, self.max_delay)
    }

    /// The delay with jitter applied; what the engine actually sleeps.
    pub fn sleep_for_attempt(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.delay_for_attempt(attempt))
    }
}
