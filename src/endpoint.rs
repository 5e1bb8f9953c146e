//! Endpoint descriptions and wire-request assembly.
//!
//! An [`Endpoint`] is a value describing one remote operation: where it goes,
//! how it is shaped, and which policies govern it. The engine turns it into a
//! [`WireRequest`] via [`Endpoint::to_wire_request`] before anything touches
//! the transport.

use crate::body::{Codec, EncodedBody, RequestBody};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use std::time::Duration;
use url::Url;

/// Cache behavior for a single endpoint.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Consult the cache before going to the network.
    pub read_from_cache: bool,
    /// Store successful response bytes after the call.
    pub write_to_cache: bool,
    /// Entry TTL; overrides the engine default when set.
    pub ttl: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            read_from_cache: true,
            write_to_cache: true,
            ttl: None,
        }
    }
}

impl CachePolicy {
    /// A policy that never touches the cache.
    pub fn disabled() -> Self {
        Self {
            read_from_cache: false,
            write_to_cache: false,
            ttl: None,
        }
    }
}

/// Returns `true` for methods whose responses are cache-eligible (GET, HEAD).
pub fn method_is_cacheable(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

/// Returns `true` for methods that may carry a request body.
pub fn method_has_body(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// A value describing a single remote operation.
///
/// # Examples
///
/// ```
/// use caravel::{Endpoint, RequestBody};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), caravel::Error> {
/// let endpoint = Endpoint::post("https://api.example.com", "/users")?
///     .with_body(RequestBody::structured(&serde_json::json!({"name": "A"}))?)
///     .with_query_param("notify", "true")
///     .with_timeout(Duration::from_secs(10));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// The base URL requests are resolved against.
    pub base_url: Url,
    /// The request path, relative to `base_url`.
    pub path: String,
    /// The HTTP method.
    pub method: Method,
    /// Additional headers for this endpoint.
    pub headers: HeaderMap,
    /// Query parameters, appended in insertion order.
    pub query: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<RequestBody>,
    /// Per-endpoint timeout; overrides the engine default when set.
    pub timeout: Option<Duration>,
    /// Cache behavior for this endpoint.
    pub cache_policy: CachePolicy,
    /// Retry policy; overrides the engine default when set.
    pub retry_policy: Option<RetryPolicy>,
    /// Whether the authenticator must run before dispatch.
    pub requires_auth: bool,
    /// `Content-Type` override for the encoded body.
    pub content_type: Option<String>,
    /// Value for the `Accept` header.
    pub accept: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint with the given method, base URL, and path.
    pub fn new(method: Method, base_url: impl AsRef<str>, path: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url.as_ref())?,
            path: path.into(),
            method,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
            cache_policy: CachePolicy::default(),
            retry_policy: None,
            requires_auth: false,
            content_type: None,
            accept: None,
        })
    }

    /// Creates a GET endpoint.
    pub fn get(base_url: impl AsRef<str>, path: impl Into<String>) -> Result<Self> {
        Self::new(Method::GET, base_url, path)
    }

    /// Creates a POST endpoint.
    pub fn post(base_url: impl AsRef<str>, path: impl Into<String>) -> Result<Self> {
        Self::new(Method::POST, base_url, path)
    }

    /// Creates a PUT endpoint.
    pub fn put(base_url: impl AsRef<str>, path: impl Into<String>) -> Result<Self> {
        Self::new(Method::PUT, base_url, path)
    }

    /// Creates a PATCH endpoint.
    pub fn patch(base_url: impl AsRef<str>, path: impl Into<String>) -> Result<Self> {
        Self::new(Method::PATCH, base_url, path)
    }

    /// Creates a DELETE endpoint.
    pub fn delete(base_url: impl AsRef<str>, path: impl Into<String>) -> Result<Self> {
        Self::new(Method::DELETE, base_url, path)
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] on a malformed name or value.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::InvalidRequest(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::InvalidRequest(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends a query parameter; insertion order is preserved on the wire.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the per-endpoint timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the cache policy.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Sets a per-endpoint retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Marks the endpoint as requiring authentication.
    pub fn with_auth_required(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Overrides the `Content-Type` of the encoded body.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the `Accept` header value.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Returns `true` if responses to this endpoint are cache-eligible.
    pub fn is_cacheable(&self) -> bool {
        method_is_cacheable(&self.method)
    }

    /// Assembles the transport-layer request.
    ///
    /// Resolves the URL, applies content-type/accept defaults (user headers
    /// win), appends query parameters in insertion order, and encodes the body
    /// with `codec`.
    pub fn to_wire_request(&self, codec: &dyn Codec) -> Result<WireRequest> {
        if self.body.is_some() && !method_has_body(&self.method) {
            return Err(Error::InvalidRequest(format!(
                "method {} does not take a body",
                self.method
            )));
        }

        let mut url = self
            .base_url
            .join(&self.path)
            .map_err(|e| Error::InvalidRequest(format!("cannot resolve URL: {}", e)))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        let body = match &self.body {
            Some(body) => Some(body.encode(codec)?),
            None => None,
        };

        let mut headers = HeaderMap::new();
        if let Some(encoded) = &body {
            let content_type = self.content_type.as_deref().unwrap_or(&encoded.content_type);
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::try_from(content_type)
                    .map_err(|e| Error::InvalidRequest(format!("invalid content type: {}", e)))?,
            );
        }
        if let Some(accept) = &self.accept {
            headers.insert(
                header::ACCEPT,
                HeaderValue::try_from(accept.as_str())
                    .map_err(|e| Error::InvalidRequest(format!("invalid accept type: {}", e)))?,
            );
        }
        // Endpoint headers override policy defaults.
        for (name, value) in &self.headers {
            headers.insert(name, value.clone());
        }

        Ok(WireRequest {
            url,
            method: self.method.clone(),
            headers,
            body,
            timeout: self.timeout,
        })
    }
}

/// A fully assembled transport-layer request.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// The absolute request URL, query included.
    pub url: Url,
    /// The HTTP method.
    pub method: Method,
    /// All headers to send.
    pub headers: HeaderMap,
    /// The encoded body, when present.
    pub body: Option<EncodedBody>,
    /// Per-attempt timeout, when set.
    pub timeout: Option<Duration>,
}

impl WireRequest {
    /// Sets or replaces a header.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::JsonCodec;

    #[test]
    fn url_resolution_joins_base_and_path() {
        let endpoint = Endpoint::get("https://api.example.com", "/users/1").unwrap();
        let wire = endpoint.to_wire_request(&JsonCodec).unwrap();
        assert_eq!(wire.url.as_str(), "https://api.example.com/users/1");
        assert_eq!(wire.method, Method::GET);
    }

    #[test]
    fn query_params_keep_insertion_order() {
        let endpoint = Endpoint::get("https://api.example.com", "/search")
            .unwrap()
            .with_query_param("b", "2")
            .with_query_param("a", "1");
        let wire = endpoint.to_wire_request(&JsonCodec).unwrap();
        assert_eq!(wire.url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn user_headers_override_defaults() {
        let endpoint = Endpoint::post("https://api.example.com", "/users")
            .unwrap()
            .with_body(RequestBody::structured(&serde_json::json!({"a": 1})).unwrap())
            .with_header("content-type", "application/vnd.custom+json")
            .unwrap();
        let wire = endpoint.to_wire_request(&JsonCodec).unwrap();
        assert_eq!(
            wire.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.custom+json"
        );
    }

    #[test]
    fn body_on_get_is_rejected() {
        let endpoint = Endpoint::get("https://api.example.com", "/x")
            .unwrap()
            .with_body(RequestBody::raw(&b"oops"[..], "text/plain"));
        assert!(matches!(
            endpoint.to_wire_request(&JsonCodec),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn only_get_and_head_are_cacheable() {
        assert!(method_is_cacheable(&Method::GET));
        assert!(method_is_cacheable(&Method::HEAD));
        assert!(!method_is_cacheable(&Method::POST));
        assert!(!method_is_cacheable(&Method::DELETE));
    }

    #[test]
    fn accept_header_is_applied() {
        let endpoint = Endpoint::get("https://api.example.com", "/x")
            .unwrap()
            .with_accept("application/json");
        let wire = endpoint.to_wire_request(&JsonCodec).unwrap();
        assert_eq!(wire.headers.get(header::ACCEPT).unwrap(), "application/json");
    }
}
