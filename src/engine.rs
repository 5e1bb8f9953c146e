//! The request-execution engine.
//!
//! [`Engine`] orchestrates one logical call end to end: wire assembly,
//! pre-request interceptors, authentication, cache lookup, the retry loop
//! behind the circuit breaker, status classification, cache write-back, and
//! post-response interceptors. Protocol frontends (REST, GraphQL, SSE,
//! WebSocket, gRPC) are all consumers of this one pipeline.

use crate::auth::Authenticator;
use crate::body::{Codec, JsonCodec};
use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::cache::{Cache, CacheKey};
use crate::context::{RequestContext, NO_REQUEUE_TAG};
use crate::endpoint::{method_has_body, Endpoint, WireRequest};
use crate::interceptor::{run_request_interceptors, run_response_interceptors, Interceptor};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::queue::{OfflineQueue, QueuedRequest};
use crate::rate_limit::{RateLimitConfig, RateLimitInfo, RateLimitObserver};
use crate::response::{RawResponse, Response, ResponseMetadata};
use crate::retry::RetryPolicy;
use crate::streaming::ByteStream;
use crate::{Error, Result};
use bytes::Bytes;
use futures::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

/// Progress callback: `(bytes transferred, total when known)`.
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// The request-execution engine.
///
/// Cheap to clone; clones share the same cache, queue, breaker, and metrics.
///
/// # Examples
///
/// ```no_run
/// use caravel::{Endpoint, Engine, RetryPolicy};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), caravel::Error> {
/// let engine = Engine::builder()
///     .retry_policy(RetryPolicy::new(3))
///     .build()?;
///
/// let endpoint = Endpoint::get("https://api.example.com", "/users/1")?;
/// let user = engine.execute::<User>(&endpoint).await?;
/// println!("{} ({} retries)", user.data.name, user.metadata.retry_count);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    http: reqwest::Client,
    codec: Arc<dyn Codec>,
    cache: Option<Arc<dyn Cache>>,
    queue: Option<Arc<OfflineQueue>>,
    authenticator: Mutex<Option<Arc<dyn Authenticator>>>,
    interceptors: Mutex<Vec<Arc<dyn Interceptor>>>,
    breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    default_timeout: Option<Duration>,
    default_cache_ttl: Option<Duration>,
    queue_priority: i32,
    rate_limit_config: RateLimitConfig,
    rate_limit_observer: RateLimitObserver,
    metrics: Metrics,
}

impl Engine {
    /// Creates a new [`EngineBuilder`].
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Executes `endpoint` and decodes the response payload.
    ///
    /// Runs the full pipeline: interceptors, auth, cache, retries behind the
    /// breaker, decode, cache write-back. Cache hits return with
    /// `metadata.from_cache = true` and no network attempt.
    pub async fn execute<T>(&self, endpoint: &Endpoint) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let mut ctx = RequestContext::new();
        self.execute_in_context(endpoint, &mut ctx).await
    }

    /// Executes `endpoint` with caller-supplied tags (see
    /// [`crate::context::NO_REQUEUE_TAG`]).
    pub async fn execute_tagged<T>(
        &self,
        endpoint: &Endpoint,
        tags: impl IntoIterator<Item = String>,
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let mut ctx = RequestContext::with_tags(tags);
        self.execute_in_context(endpoint, &mut ctx).await
    }

    async fn execute_in_context<T>(
        &self,
        endpoint: &Endpoint,
        ctx: &mut RequestContext,
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned,
    {
        let outcome = self.run(endpoint, ctx).await;
        let latency = ctx.started_at.elapsed();
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                self.inner.metrics.record_failure(latency);
                return Err(e);
            }
        };

        let value = match self.inner.codec.decode(&outcome.response.bytes) {
            Ok(value) => value,
            Err(e) => {
                self.inner.metrics.record_failure(latency);
                return Err(retag_decode_error(e, outcome.response.status));
            }
        };
        let data: T = match serde_json::from_value(value) {
            Ok(data) => data,
            Err(e) => {
                self.inner.metrics.record_failure(latency);
                tracing::error!(error = %e, "failed to decode response payload");
                return Err(Error::DecodingFailed {
                    raw_body: outcome.response.text(),
                    reason: e.to_string(),
                    status: outcome.response.status,
                });
            }
        };

        let byte_size = outcome.response.bytes.len() as u64;
        self.inner.metrics.record_success(latency, byte_size);
        Ok(Response {
            data,
            status: outcome.response.status,
            headers: outcome.response.headers,
            url: outcome.response.url,
            metadata: ResponseMetadata {
                request_id: ctx.request_id,
                latency,
                time_to_first_byte: outcome.time_to_first_byte,
                byte_size,
                from_cache: outcome.from_cache,
                retry_count: ctx.retry_count,
            },
        })
    }

    /// Executes `endpoint` and returns the undecoded response.
    pub async fn execute_raw(&self, endpoint: &Endpoint) -> Result<RawResponse> {
        let mut ctx = RequestContext::new();
        let latency_start = ctx.started_at;
        match self.run(endpoint, &mut ctx).await {
            Ok(outcome) => {
                self.inner
                    .metrics
                    .record_success(latency_start.elapsed(), outcome.response.bytes.len() as u64);
                Ok(outcome.response)
            }
            Err(e) => {
                self.inner.metrics.record_failure(latency_start.elapsed());
                Err(e)
            }
        }
    }

    /// Uploads `bytes` as the body of `endpoint`, reporting progress per
    /// chunk sent.
    ///
    /// The pipeline (interceptors, auth, breaker) applies; the body streams in
    /// chunks so large payloads are not retried blindly, and the retry loop is
    /// therefore skipped.
    pub async fn upload(
        &self,
        endpoint: &Endpoint,
        bytes: Bytes,
        progress: Option<ProgressFn>,
    ) -> Result<RawResponse> {
        let ctx = RequestContext::new();
        let start = Instant::now();
        let mut wire = endpoint.to_wire_request(self.inner.codec.as_ref())?;

        let interceptors = self.interceptors_snapshot();
        run_request_interceptors(&interceptors, &mut wire, &ctx).await?;
        self.authenticate_if_required(endpoint, &mut wire).await?;

        if let Err(retry_after) = self.inner.breaker.should_allow() {
            self.inner.metrics.record_failure(start.elapsed());
            return Err(Error::CircuitOpen { retry_after });
        }

        let total = bytes.len() as u64;
        if !wire.headers.contains_key(http::header::CONTENT_TYPE) {
            let content_type = endpoint
                .content_type
                .as_deref()
                .unwrap_or("application/octet-stream");
            wire.set_header(
                http::header::CONTENT_TYPE,
                HeaderValue::try_from(content_type)
                    .map_err(|e| Error::InvalidRequest(format!("invalid content type: {}", e)))?,
            );
        }

        let mut request = self
            .inner
            .http
            .request(wire.method.clone(), wire.url.clone())
            .headers(wire.headers.clone());
        if let Some(timeout) = wire.timeout.or(self.inner.default_timeout) {
            request = request.timeout(timeout);
        }

        let chunks: Vec<Bytes> = bytes
            .chunks(UPLOAD_CHUNK_SIZE)
            .map(Bytes::copy_from_slice)
            .collect();
        let body_stream = futures::stream::iter(chunks.into_iter().scan(0u64, {
            let progress = progress.clone();
            move |sent, chunk| {
                *sent += chunk.len() as u64;
                if let Some(progress) = &progress {
                    progress(*sent, Some(total));
                }
                Some(Ok::<Bytes, std::io::Error>(chunk))
            }
        }));

        let result = request.body(reqwest::Body::wrap_stream(body_stream)).send().await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.inner.breaker.record_failure();
                self.inner.metrics.record_failure(start.elapsed());
                return Err(Error::from_transport(e));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let url = Url::parse(response.url().as_str())?;
        let body = response
            .bytes()
            .await
            .map_err(Error::from_transport)?;

        if status.is_success() {
            self.inner.breaker.record_success();
            self.inner.metrics.record_success(start.elapsed(), body.len() as u64);
            Ok(RawResponse {
                bytes: body,
                status,
                headers,
                url,
            })
        } else {
            self.inner.breaker.record_failure();
            self.inner.metrics.record_failure(start.elapsed());
            Err(Error::from_status(
                status,
                String::from_utf8_lossy(&body).into_owned(),
                RateLimitInfo::from_headers(&headers).retry_after,
            ))
        }
    }

    /// Downloads the body of `endpoint` without buffering it through the
    /// decode path, reporting progress as chunks arrive.
    pub async fn download(
        &self,
        endpoint: &Endpoint,
        progress: Option<ProgressFn>,
    ) -> Result<Bytes> {
        let mut stream = self.stream(endpoint, None).await?;
        let total = stream
            .headers()
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);
            if let Some(progress) = &progress {
                progress(buf.len() as u64, total);
            }
        }
        Ok(Bytes::from(buf))
    }

    /// Opens a byte-chunk stream over `endpoint` for SSE/WebSocket-style
    /// consumers.
    ///
    /// `expected_content_type` (e.g. `text/event-stream`) is validated against
    /// the response before any chunk is yielded.
    pub async fn stream(
        &self,
        endpoint: &Endpoint,
        expected_content_type: Option<&str>,
    ) -> Result<ByteStream> {
        let ctx = RequestContext::new();
        let mut wire = endpoint.to_wire_request(self.inner.codec.as_ref())?;
        let interceptors = self.interceptors_snapshot();
        run_request_interceptors(&interceptors, &mut wire, &ctx).await?;
        self.authenticate_if_required(endpoint, &mut wire).await?;

        if let Err(retry_after) = self.inner.breaker.should_allow() {
            return Err(Error::CircuitOpen { retry_after });
        }

        let response = self
            .build_transport_request(&wire)
            .send()
            .await
            .map_err(|e| {
                self.inner.breaker.record_failure();
                Error::from_transport(e)
            })?;
        let stream = ByteStream::from_response(response, expected_content_type).await;
        match &stream {
            Ok(_) => self.inner.breaker.record_success(),
            Err(_) => self.inner.breaker.record_failure(),
        }
        stream
    }

    /// Appends an interceptor to the chain.
    pub fn add_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        self.inner.interceptors.lock().unwrap().push(interceptor);
    }

    /// Removes all interceptors.
    pub fn clear_interceptors(&self) {
        self.inner.interceptors.lock().unwrap().clear();
    }

    /// Installs (or replaces) the authenticator.
    pub fn set_authenticator(&self, authenticator: Arc<dyn Authenticator>) {
        *self.inner.authenticator.lock().unwrap() = Some(authenticator);
    }

    /// Clears every cache tier. Idempotent.
    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear().await;
        }
    }

    /// Returns a point-in-time copy of the call counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The engine's offline queue, when configured.
    pub fn offline_queue(&self) -> Option<Arc<OfflineQueue>> {
        self.inner.queue.clone()
    }

    /// Drains the configured offline queue through this engine.
    pub async fn process_offline_queue<F>(&self, on_result: F) -> Result<()>
    where
        F: FnMut(&QueuedRequest, &Result<RawResponse>),
    {
        match &self.inner.queue {
            Some(queue) => queue.process_queue(self, on_result).await,
            None => Ok(()),
        }
    }

    /// Replays a queued request. Tagged `no-requeue`, so another connectivity
    /// failure surfaces to the queue's retry accounting instead of cycling
    /// back through [`OfflineQueue::enqueue`].
    pub(crate) async fn replay_queued(&self, entry: &QueuedRequest) -> Result<RawResponse> {
        let mut ctx = RequestContext::with_tags([NO_REQUEUE_TAG.to_string()]);
        let url = Url::parse(&entry.url)?;
        let method = Method::from_str(&entry.method)
            .map_err(|_| Error::InvalidRequest(format!("bad queued method {}", entry.method)))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &entry.headers {
            if let (Ok(name), Ok(value)) =
                (HeaderName::from_str(name), HeaderValue::from_str(value))
            {
                headers.insert(name, value);
            }
        }
        let mut wire = WireRequest {
            url,
            method,
            headers,
            body: entry.body.clone().map(|bytes| crate::body::EncodedBody {
                bytes: Bytes::from(bytes),
                content_type: String::new(),
            }),
            timeout: None,
        };
        let (response, _ttfb) = self
            .transport_loop(&mut wire, false, &self.inner.retry_policy, &mut ctx)
            .await?;
        Ok(response)
    }

    fn interceptors_snapshot(&self) -> Vec<Arc<dyn Interceptor>> {
        self.inner.interceptors.lock().unwrap().clone()
    }

    fn authenticator(&self) -> Option<Arc<dyn Authenticator>> {
        self.inner.authenticator.lock().unwrap().clone()
    }

    async fn authenticate_if_required(
        &self,
        endpoint: &Endpoint,
        wire: &mut WireRequest,
    ) -> Result<()> {
        if !endpoint.requires_auth {
            return Ok(());
        }
        match self.authenticator() {
            Some(auth) => auth.authenticate(wire).await,
            None => Err(Error::AuthenticationRequired),
        }
    }

    /// The full pipeline for one logical call, minus decoding.
    async fn run(&self, endpoint: &Endpoint, ctx: &mut RequestContext) -> Result<CallOutcome> {
        let mut wire = endpoint.to_wire_request(self.inner.codec.as_ref())?;
        tracing::debug!(
            request_id = %ctx.request_id,
            method = %wire.method,
            url = %wire.url,
            "executing request"
        );

        let interceptors = self.interceptors_snapshot();
        run_request_interceptors(&interceptors, &mut wire, ctx).await?;
        self.authenticate_if_required(endpoint, &mut wire).await?;

        // Non-cacheable methods never touch the cache regardless of policy.
        let cache_key = if endpoint.is_cacheable() && self.inner.cache.is_some() {
            Some(CacheKey::new(
                &wire.url,
                &wire.method,
                wire.body.as_ref().map(|b| b.bytes.as_ref()),
            ))
        } else {
            None
        };

        if endpoint.cache_policy.read_from_cache {
            if let (Some(cache), Some(key)) = (&self.inner.cache, &cache_key) {
                if let Some(bytes) = cache.get(key).await {
                    tracing::debug!(request_id = %ctx.request_id, "served from cache");
                    let mut response = RawResponse {
                        bytes,
                        status: StatusCode::OK,
                        headers: HeaderMap::new(),
                        url: wire.url.clone(),
                    };
                    run_response_interceptors(&interceptors, &mut response, ctx).await?;
                    return Ok(CallOutcome {
                        response,
                        from_cache: true,
                        time_to_first_byte: None,
                    });
                }
            }
        }

        let policy = endpoint
            .retry_policy
            .clone()
            .unwrap_or_else(|| self.inner.retry_policy.clone());
        let result = self
            .transport_loop(&mut wire, endpoint.requires_auth, &policy, ctx)
            .await;

        let (mut response, time_to_first_byte) = match result {
            Ok(ok) => ok,
            Err(e) => {
                self.maybe_enqueue_offline(&wire, ctx, &e).await;
                return Err(e);
            }
        };

        if endpoint.cache_policy.write_to_cache {
            if let (Some(cache), Some(key)) = (&self.inner.cache, &cache_key) {
                let ttl = endpoint.cache_policy.ttl.or(self.inner.default_cache_ttl);
                if let Err(e) = cache.put(key.clone(), response.bytes.clone(), ttl).await {
                    tracing::warn!(error = %e, "response cache write failed");
                }
            }
        }

        run_response_interceptors(&interceptors, &mut response, ctx).await?;
        Ok(CallOutcome {
            response,
            from_cache: false,
            time_to_first_byte: Some(time_to_first_byte),
        })
    }

    /// The retry loop: breaker gate, transport attempt, classification,
    /// one-shot 401 refresh, Retry-After-aware backoff.
    async fn transport_loop(
        &self,
        wire: &mut WireRequest,
        requires_auth: bool,
        policy: &RetryPolicy,
        ctx: &mut RequestContext,
    ) -> Result<(RawResponse, Duration)> {
        let mut attempt: u32 = 0;
        let mut attempts_made: u32 = 0;
        let mut auth_retried = false;

        loop {
            if self.inner.rate_limit_config.enabled && self.inner.rate_limit_config.proactive {
                if let Some(host) = wire.url.host_str() {
                    if let Some(wait) = self.inner.rate_limit_observer.wait_for(host) {
                        let wait = wait.min(self.inner.rate_limit_config.max_wait);
                        tracing::info!(host, wait_ms = wait.as_millis() as u64, "proactively waiting out rate-limit window");
                        tokio::time::sleep(wait).await;
                    }
                }
            }

            if let Err(retry_after) = self.inner.breaker.should_allow() {
                tracing::warn!(request_id = %ctx.request_id, "circuit open, rejecting call");
                return Err(Error::CircuitOpen { retry_after });
            }

            let attempt_start = Instant::now();
            attempts_made += 1;
            let send_result = self.build_transport_request(wire).send().await;

            let error = match send_result {
                Ok(response) => {
                    let time_to_first_byte = attempt_start.elapsed();
                    let status = response.status();
                    let headers = response.headers().clone();
                    let url = Url::parse(response.url().as_str())?;

                    let rate_info = if self.inner.rate_limit_config.enabled {
                        let info = RateLimitInfo::from_headers(&headers);
                        if let Some(host) = url.host_str() {
                            self.inner.rate_limit_observer.observe(host, &info);
                        }
                        Some(info)
                    } else {
                        None
                    };

                    if status.is_success() {
                        let bytes = response.bytes().await.map_err(Error::from_transport)?;
                        self.inner.breaker.record_success();
                        tracing::info!(
                            request_id = %ctx.request_id,
                            status = status.as_u16(),
                            attempts = attempts_made,
                            "request succeeded"
                        );
                        return Ok((
                            RawResponse {
                                bytes,
                                status,
                                headers,
                                url,
                            },
                            time_to_first_byte,
                        ));
                    }

                    if status == StatusCode::UNAUTHORIZED && requires_auth && !auth_retried {
                        if let Some(auth) = self.authenticator() {
                            tracing::info!(request_id = %ctx.request_id, "401 received, refreshing credentials");
                            auth.refresh().await?;
                            auth.authenticate(wire).await?;
                            auth_retried = true;
                            // One-shot: does not count against the retry policy.
                            continue;
                        }
                    }

                    let body = response.text().await.unwrap_or_default();
                    let retry_after = rate_info.as_ref().and_then(|i| i.retry_after);
                    Error::from_status(status, body, retry_after)
                }
                Err(e) => Error::from_transport(e),
            };

            self.inner.breaker.record_failure();
            tracing::warn!(
                request_id = %ctx.request_id,
                error = %error,
                attempt = attempt,
                "request attempt failed"
            );

            if !policy.should_retry(&error, attempt) {
                if policy.retryable_kind(&error) && attempt >= policy.max_attempts {
                    // Retries exhausted on a recoverable error.
                    return Err(Error::MaxRetriesExceeded {
                        attempts: attempts_made,
                        last_error: Box::new(error),
                    });
                }
                return Err(error);
            }

            // Server-directed delay wins when it is larger than the backoff.
            let mut delay = policy.sleep_for_attempt(attempt);
            if let Some(server_delay) = error.retry_after() {
                let server_delay = server_delay.min(self.inner.rate_limit_config.max_wait);
                if server_delay > delay {
                    delay = server_delay;
                }
            }
            tracing::info!(
                request_id = %ctx.request_id,
                delay_ms = delay.as_millis() as u64,
                attempt = attempt,
                "retrying after delay"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            ctx.retry_count = attempt;
        }
    }

    fn build_transport_request(&self, wire: &WireRequest) -> reqwest::RequestBuilder {
        let mut request = self
            .inner
            .http
            .request(wire.method.clone(), wire.url.clone())
            .headers(wire.headers.clone());
        if let Some(timeout) = wire.timeout.or(self.inner.default_timeout) {
            // Timeout covers this attempt only; retries start fresh.
            request = request.timeout(timeout);
        }
        if let Some(body) = &wire.body {
            request = request.body(body.bytes.clone());
        }
        request
    }

    /// Queues a body-carrying request that failed on connectivity, unless the
    /// context forbids it.
    async fn maybe_enqueue_offline(&self, wire: &WireRequest, ctx: &RequestContext, error: &Error) {
        let Some(queue) = &self.inner.queue else {
            return;
        };
        if ctx.no_requeue() || !method_has_body(&wire.method) {
            return;
        }
        let connectivity = match error {
            Error::MaxRetriesExceeded { last_error, .. } => last_error.is_connectivity(),
            e => e.is_connectivity(),
        };
        if !connectivity {
            return;
        }
        let entry = QueuedRequest::new(
            &wire.url,
            &wire.method,
            &wire.headers,
            wire.body.as_ref().map(|b| b.bytes.clone()),
            self.inner.queue_priority,
        );
        match queue.enqueue(entry).await {
            Ok(()) => tracing::info!(request_id = %ctx.request_id, "request queued for offline replay"),
            Err(e) => tracing::warn!(error = %e, "could not queue request for offline replay"),
        }
    }
}

struct CallOutcome {
    response: RawResponse,
    from_cache: bool,
    time_to_first_byte: Option<Duration>,
}

fn retag_decode_error(e: Error, status: StatusCode) -> Error {
    match e {
        Error::DecodingFailed {
            raw_body, reason, ..
        } => Error::DecodingFailed {
            raw_body,
            reason,
            status,
        },
        other => other,
    }
}

/// Builder for configuring and creating an [`Engine`].
///
/// # Examples
///
/// ```no_run
/// use caravel::{Engine, RetryPolicy};
/// use caravel::breaker::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), caravel::Error> {
/// let engine = Engine::builder()
///     .timeout(Duration::from_secs(30))
///     .retry_policy(RetryPolicy::new(3))
///     .breaker_config(CircuitBreakerConfig::default().with_failure_threshold(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct EngineBuilder {
    codec: Arc<dyn Codec>,
    cache: Option<Arc<dyn Cache>>,
    queue: Option<Arc<OfflineQueue>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    breaker_config: CircuitBreakerConfig,
    retry_policy: RetryPolicy,
    default_timeout: Option<Duration>,
    default_cache_ttl: Option<Duration>,
    queue_priority: i32,
    rate_limit_config: RateLimitConfig,
}

impl EngineBuilder {
    /// Creates a builder with JSON codec, default retry policy, and no cache
    /// or queue.
    pub fn new() -> Self {
        Self {
            codec: Arc::new(JsonCodec),
            cache: None,
            queue: None,
            authenticator: None,
            interceptors: Vec::new(),
            breaker_config: CircuitBreakerConfig::default(),
            retry_policy: RetryPolicy::default(),
            default_timeout: None,
            default_cache_ttl: None,
            queue_priority: 0,
            rate_limit_config: RateLimitConfig::default(),
        }
    }

    /// Replaces the default JSON codec.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Attaches a response cache.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attaches an offline queue for connectivity failures.
    pub fn offline_queue(mut self, queue: Arc<OfflineQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Installs an authenticator.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Registers an interceptor; order of registration is pre-request order.
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Configures the circuit breaker.
    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Sets the engine-default retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the engine-default per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Sets the TTL applied to cached responses when the endpoint does not
    /// specify one.
    pub fn default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = Some(ttl);
        self
    }

    /// Sets the priority assigned to auto-queued offline requests.
    pub fn queue_priority(mut self, priority: i32) -> Self {
        self.queue_priority = priority;
        self
    }

    /// Configures rate-limit handling.
    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit_config = config;
        self
    }

    /// Builds the configured [`Engine`].
    pub fn build(self) -> Result<Engine> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;
        Ok(Engine {
            inner: Arc::new(EngineInner {
                http,
                codec: self.codec,
                cache: self.cache,
                queue: self.queue,
                authenticator: Mutex::new(self.authenticator),
                interceptors: Mutex::new(self.interceptors),
                breaker: CircuitBreaker::new(self.breaker_config),
                retry_policy: self.retry_policy,
                default_timeout: self.default_timeout,
                default_cache_ttl: self.default_cache_ttl,
                queue_priority: self.queue_priority,
                rate_limit_config: self.rate_limit_config,
                rate_limit_observer: RateLimitObserver::new(),
                metrics: Metrics::new(),
            }),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
