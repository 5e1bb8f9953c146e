//! Response wrappers that preserve both decoded data and transaction metadata.
//!
//! [`Response`] wraps the decoded payload along with metadata about the HTTP
//! transaction (latency, retry attempts, cache provenance). [`RawResponse`] is
//! the undecoded form used by `execute_raw`, uploads, and the post-response
//! interceptor chain.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Metadata about a completed HTTP transaction.
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// The request id from the call's [`crate::RequestContext`].
    pub request_id: Uuid,
    /// Total latency of the call, including all retry attempts.
    pub latency: Duration,
    /// Time until the response headers were available, when measured.
    pub time_to_first_byte: Option<Duration>,
    /// Size of the response body in bytes.
    pub byte_size: u64,
    /// Whether the body was served from the cache without a network attempt.
    pub from_cache: bool,
    /// Transport retries consumed by the retry policy (0 = first try worked).
    pub retry_count: u32,
}

/// An undecoded HTTP response: raw bytes plus status, headers, and URL.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The response body bytes.
    pub bytes: Bytes,
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The URL the response was served from.
    pub url: Url,
}

impl RawResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// A decoded HTTP response.
///
/// # Examples
///
/// ```no_run
/// use caravel::{Engine, Endpoint};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example(engine: Engine) -> Result<(), caravel::Error> {
/// let endpoint = Endpoint::get("https://api.example.com", "/users/123")?;
/// let response = engine.execute::<User>(&endpoint).await?;
///
/// println!("User: {}", response.data.name);
/// println!("Request took {:?}", response.metadata.latency);
/// println!("Served from cache: {}", response.metadata.from_cache);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded response payload.
    pub data: T,
    /// The HTTP status code of the response.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The URL the response was served from.
    pub url: Url,
    /// Transaction metadata.
    pub metadata: ResponseMetadata,
}

impl<T> Response<T> {
    /// Returns `true` for statuses in [200, 300).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns `true` for statuses in [400, 500).
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Returns `true` for statuses in [500, 600).
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Returns `true` if the call consumed at least one retry.
    pub fn was_retried(&self) -> bool {
        self.metadata.retry_count > 0
    }

    /// Returns a header value by name, when present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Maps the payload to a different type, preserving the metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            url: self.url,
            metadata: self.metadata,
        }
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: StatusCode) -> Response<u32> {
        Response {
            data: 42,
            status,
            headers: HeaderMap::new(),
            url: Url::parse("https://api.example.com/x").unwrap(),
            metadata: ResponseMetadata {
                request_id: Uuid::new_v4(),
                latency: Duration::from_millis(5),
                time_to_first_byte: None,
                byte_size: 2,
                from_cache: false,
                retry_count: 0,
            },
        }
    }

    #[test]
    fn status_predicates() {
        assert!(sample(StatusCode::OK).is_success());
        assert!(sample(StatusCode::NOT_FOUND).is_client_error());
        assert!(sample(StatusCode::BAD_GATEWAY).is_server_error());
    }

    #[test]
    fn map_preserves_metadata() {
        let response = sample(StatusCode::OK);
        let id = response.metadata.request_id;
        let mapped = response.map(|n| n.to_string());
        assert_eq!(mapped.data, "42");
        assert_eq!(mapped.metadata.request_id, id);
    }

    #[test]
    fn deref_reaches_payload() {
        let response = sample(StatusCode::OK);
        assert_eq!(*response, 42);
    }
}
