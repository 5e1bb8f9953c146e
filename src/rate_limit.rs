//! Rate-limit header interpretation and proactive throttling.
//!
//! Parses the common rate-limit response headers (`X-RateLimit-Limit`,
//! `X-RateLimit-Remaining`, `X-RateLimit-Reset`, `Retry-After`) into a
//! structured [`RateLimitInfo`], and tracks exhausted windows per host so the
//! engine can delay follow-up calls until the window resets.

use http::HeaderMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Information extracted from rate-limit headers.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Requests allowed in the current window (`X-RateLimit-Limit`).
    pub limit: Option<u64>,
    /// Requests remaining in the current window (`X-RateLimit-Remaining`).
    pub remaining: Option<u64>,
    /// When the window resets (`X-RateLimit-Reset`, Unix timestamp).
    pub reset_at: Option<SystemTime>,
    /// Server-directed wait (`Retry-After`, seconds or HTTP date).
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    /// Extracts rate-limit information from response headers.
    ///
    /// # Examples
    ///
    /// ```
    /// use caravel::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    /// headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert!(info.retry_after.is_some());
    /// assert!(info.is_exhausted());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: parse_u64_header(headers, "x-ratelimit-limit"),
            remaining: parse_u64_header(headers, "x-ratelimit-remaining"),
            reset_at: parse_reset(headers),
            retry_after: parse_retry_after(headers),
        }
    }

    /// Returns the recommended wait before the next call, capped at
    /// `max_wait`. Prefers an explicit `Retry-After`, falling back to the
    /// window reset time.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }
        if let Some(reset_at) = self.reset_at {
            if let Ok(until_reset) = reset_at.duration_since(SystemTime::now()) {
                return Some(until_reset.min(max_wait));
            }
        }
        None
    }

    /// Returns `true` when the window is spent: `Retry-After` was sent, or
    /// zero requests remain before a future reset.
    pub fn is_exhausted(&self) -> bool {
        if self.retry_after.is_some() {
            return true;
        }
        self.remaining == Some(0)
            && self
                .reset_at
                .map(|reset| reset > SystemTime::now())
                .unwrap_or(true)
    }
}

/// Configuration for rate-limit handling.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Parse headers and honor server-directed waits.
    pub enabled: bool,
    /// Hard cap on any rate-limit wait.
    pub max_wait: Duration,
    /// Delay calls to a host whose window is known-exhausted before sending.
    pub proactive: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait: Duration::from_secs(300),
            proactive: false,
        }
    }
}

impl RateLimitConfig {
    /// A configuration with handling turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Enables proactive per-host delays.
    pub fn with_proactive(mut self) -> Self {
        self.proactive = true;
        self
    }

    /// Sets the wait cap.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Tracks exhausted rate-limit windows per host.
#[derive(Default)]
pub struct RateLimitObserver {
    reset_by_host: Mutex<HashMap<String, SystemTime>>,
}

impl RateLimitObserver {
    /// Creates an empty observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest window info observed for `host`.
    pub fn observe(&self, host: &str, info: &RateLimitInfo) {
        let mut map = self.reset_by_host.lock().unwrap();
        if info.is_exhausted() {
            if let Some(reset_at) = info.reset_at {
                map.insert(host.to_string(), reset_at);
                tracing::debug!(host, "rate-limit window exhausted");
                return;
            }
        }
        map.remove(host);
    }

    /// Returns how long calls to `host` should wait for the window to reset,
    /// if the last observation exhausted it.
    pub fn wait_for(&self, host: &str) -> Option<Duration> {
        let mut map = self.reset_by_host.lock().unwrap();
        let reset_at = *map.get(host)?;
        match reset_at.duration_since(SystemTime::now()) {
            Ok(wait) => Some(wait),
            Err(_) => {
                map.remove(host);
                None
            }
        }
    }
}

fn parse_u64_header(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

/// Parses `Retry-After`: delay-seconds or an RFC 7231 HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;
    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    if let Ok(date) = httpdate::parse_http_date(header) {
        if let Ok(duration) = date.duration_since(SystemTime::now()) {
            return Some(duration);
        }
    }
    None
}

fn parse_reset(headers: &HeaderMap) -> Option<SystemTime> {
    let timestamp: u64 = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse().ok()?;
    Some(UNIX_EPOCH + Duration::from_secs(timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn epoch_in(seconds: u64) -> u64 {
        (SystemTime::now() + Duration::from_secs(seconds))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn parses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));
        let info = RateLimitInfo::from_headers(&headers);
        assert_eq!(info.retry_after, Some(Duration::from_secs(60)));
        assert!(info.is_exhausted());
    }

    #[test]
    fn parses_limit_remaining_reset() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("100"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&epoch_in(120).to_string()).unwrap(),
        );
        let info = RateLimitInfo::from_headers(&headers);
        assert_eq!(info.limit, Some(100));
        assert_eq!(info.remaining, Some(42));
        assert!(info.reset_at.is_some());
        assert!(!info.is_exhausted());
    }

    #[test]
    fn zero_remaining_before_reset_is_exhausted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&epoch_in(60).to_string()).unwrap(),
        );
        let info = RateLimitInfo::from_headers(&headers);
        assert!(info.is_exhausted());
        let delay = info.delay(Duration::from_secs(300)).unwrap();
        assert!(delay <= Duration::from_secs(60));
    }

    #[test]
    fn delay_is_capped_by_max_wait() {
        let info = RateLimitInfo {
            limit: None,
            remaining: Some(0),
            reset_at: None,
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(
            info.delay(Duration::from_secs(300)),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn observer_tracks_exhausted_hosts() {
        let observer = RateLimitObserver::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&epoch_in(30).to_string()).unwrap(),
        );
        observer.observe("api.example.com", &RateLimitInfo::from_headers(&headers));

        let wait = observer.wait_for("api.example.com").unwrap();
        assert!(wait <= Duration::from_secs(30));
        assert!(observer.wait_for("other.example.com").is_none());
    }

    #[test]
    fn observer_clears_on_recovered_window() {
        let observer = RateLimitObserver::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&epoch_in(30).to_string()).unwrap(),
        );
        observer.observe("api.example.com", &RateLimitInfo::from_headers(&headers));

        let mut recovered = HeaderMap::new();
        recovered.insert("x-ratelimit-remaining", HeaderValue::from_static("99"));
        observer.observe("api.example.com", &RateLimitInfo::from_headers(&recovered));
        assert!(observer.wait_for("api.example.com").is_none());
    }
}
