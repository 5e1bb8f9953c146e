//! Error types for the request-execution engine.
//!
//! This module provides a closed error taxonomy that preserves maximum debugging
//! information while remaining ergonomic to use. Every transport-layer error is
//! classified into one of these kinds before it reaches a caller, so retry
//! policies and circuit breakers can reason about failures uniformly.

use http::StatusCode;
use std::time::Duration;

/// The main error type for engine calls.
///
/// Errors are grouped by where they arise: request shaping, the HTTP response,
/// connectivity, authentication, caching, and the offline queue. Classification
/// predicates ([`Error::is_retryable`], [`Error::is_connectivity`],
/// [`Error::is_auth_error`]) drive the retry controller and the sync manager.
///
/// # Examples
///
/// ```no_run
/// use caravel::{Engine, Endpoint, Error};
///
/// # async fn example(engine: Engine) -> Result<(), Error> {
/// let endpoint = Endpoint::get("https://api.example.com", "/users/1")?;
/// match engine.execute::<serde_json::Value>(&endpoint).await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::RateLimited { retry_after }) => {
///         eprintln!("Rate limited, retry after {:?}", retry_after);
///     }
///     Err(Error::MaxRetriesExceeded { attempts, last_error }) => {
///         eprintln!("Gave up after {} attempts: {}", attempts, last_error);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An invalid URL was provided or composed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request could not be assembled (bad header, missing configuration).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failed to encode the request body.
    #[error("Failed to encode request body: {0}")]
    EncodingFailed(String),

    /// The transport produced no response at all.
    #[error("No response received")]
    NoResponse,

    /// The response carried no body where one was required.
    #[error("Response contained no data")]
    NoData,

    /// Failed to decode the response body into the expected type.
    ///
    /// Preserves both the raw response text and the codec error message,
    /// making it easy to debug decode issues in production.
    #[error("Failed to decode response (status {status}): {reason}")]
    DecodingFailed {
        /// The raw response body that failed to decode.
        raw_body: String,
        /// The codec error message.
        reason: String,
        /// The HTTP status code of the response.
        status: StatusCode,
    },

    /// The response violated the engine's expectations (e.g. wrong content
    /// type on a stream).
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The server returned a 4xx status other than 401/403/404/429.
    #[error("Client error {status}: {body}")]
    ClientError {
        /// The HTTP status code.
        status: StatusCode,
        /// The raw response body.
        body: String,
    },

    /// The server returned a 5xx status.
    #[error("Server error {status}: {body}")]
    ServerError {
        /// The HTTP status code.
        status: StatusCode,
        /// The raw response body.
        body: String,
    },

    /// The server returned 401 and the single refresh-and-retry was spent.
    #[error("Unauthorized")]
    Unauthorized,

    /// The server returned 403.
    #[error("Forbidden")]
    Forbidden,

    /// The server returned 404.
    #[error("Not found")]
    NotFound,

    /// The server returned 429.
    #[error("Rate limited")]
    RateLimited {
        /// Parsed `Retry-After` delay, when the server sent one.
        retry_after: Option<Duration>,
    },

    /// No network route to the host.
    #[error("No connection")]
    NoConnection,

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    SslError(String),

    /// Host name resolution failed.
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    /// The remote refused the connection.
    #[error("Connection refused")]
    ConnectionRefused,

    /// The connection was reset mid-flight.
    #[error("Connection reset")]
    ConnectionReset,

    /// The endpoint requires authentication but no authenticator is set.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The access token is past its expiry and no refresh path exists.
    #[error("Token expired")]
    TokenExpired,

    /// A token refresh was attempted and failed.
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// No cache entry exists for the key.
    ///
    /// Cache reads inside the engine treat a miss as "go to the network";
    /// this kind exists for callers driving a cache tier directly.
    #[error("Cache miss")]
    CacheMiss,

    /// The cache entry exists but its TTL has lapsed.
    #[error("Cache entry expired")]
    CacheExpired,

    /// A cache write could not be committed.
    #[error("Cache write failed: {0}")]
    CacheWriteFailed(String),

    /// The offline queue is at capacity.
    #[error("Offline queue is full (capacity {capacity})")]
    OfflineQueueFull {
        /// The configured maximum number of queued requests.
        capacity: usize,
    },

    /// The circuit breaker is open and rejected the call.
    #[error("Circuit open, retry after {retry_after:?}")]
    CircuitOpen {
        /// Time remaining until the breaker will admit a probe.
        retry_after: Duration,
    },

    /// Maximum number of retries was exceeded.
    ///
    /// Returned when all retry attempts have been exhausted. Carries the last
    /// classified error so callers can see the true terminal cause.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// The number of transport attempts made.
        attempts: u32,
        /// The last error encountered before giving up.
        last_error: Box<Error>,
    },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// An unclassifiable failure.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Classifies a transport-layer error into the taxonomy.
    ///
    /// `reqwest` does not expose connect-failure detail portably, so the error
    /// source chain is inspected for the common kinds; anything else at the
    /// connect layer maps to [`Error::NoConnection`].
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Timeout;
        }
        let detail = source_chain(&err);
        if err.is_connect() {
            if detail.contains("dns") || detail.contains("resolve") {
                return Error::DnsFailure(detail);
            }
            if detail.contains("refused") {
                return Error::ConnectionRefused;
            }
            if detail.contains("reset") {
                return Error::ConnectionReset;
            }
            if detail.contains("certificate") || detail.contains("tls") || detail.contains("ssl") {
                return Error::SslError(detail);
            }
            return Error::NoConnection;
        }
        if detail.contains("reset") {
            return Error::ConnectionReset;
        }
        if err.is_body() || err.is_decode() {
            return Error::NoData;
        }
        Error::Unknown(err.to_string())
    }

    /// Classifies a non-2xx status code into the taxonomy.
    ///
    /// `retry_after` is the parsed `Retry-After` delay when the server sent
    /// one; it is only attached to [`Error::RateLimited`].
    pub fn from_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> Self {
        match status.as_u16() {
            401 => Error::Unauthorized,
            403 => Error::Forbidden,
            404 => Error::NotFound,
            429 => Error::RateLimited { retry_after },
            400..=499 => Error::ClientError { status, body },
            500..=599 => Error::ServerError { status, body },
            _ => Error::InvalidResponse(format!("unexpected status {}", status)),
        }
    }

    /// Returns `true` if this error is potentially recoverable by retrying.
    ///
    /// Connectivity errors, timeouts, 5xx server errors, 408 and 429 are
    /// retryable. Request-shape, decode, and auth errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ServerError { .. } | Error::RateLimited { .. } => true,
            Error::ClientError { status, .. } => status.as_u16() == 408,
            _ => self.is_connectivity(),
        }
    }

    /// Returns `true` for errors caused by the network rather than the peer.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::NoConnection
                | Error::Timeout
                | Error::SslError(_)
                | Error::DnsFailure(_)
                | Error::ConnectionRefused
                | Error::ConnectionReset
        )
    }

    /// Returns `true` for authentication-related errors.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized
                | Error::AuthenticationRequired
                | Error::TokenExpired
                | Error::TokenRefreshFailed(_)
        )
    }

    /// Returns the HTTP status code if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::ClientError { status, .. } | Error::ServerError { status, .. } => Some(*status),
            Error::DecodingFailed { status, .. } => Some(*status),
            Error::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Error::Forbidden => Some(StatusCode::FORBIDDEN),
            Error::NotFound => Some(StatusCode::NOT_FOUND),
            Error::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            _ => None,
        }
    }

    /// Returns the raw response body if this error preserves one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Error::ClientError { body, .. } | Error::ServerError { body, .. } => Some(body),
            Error::DecodingFailed { raw_body, .. } => Some(raw_body),
            _ => None,
        }
    }

    /// Returns the server-directed retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn source_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ").to_lowercase()
}

/// A specialized `Result` type for engine calls.
pub type Result<T> = std::result::Result<T, Error>;
