//! Credential attachment and token refresh.
//!
//! An [`Authenticator`] attaches per-scheme credentials to an assembled
//! [`WireRequest`] and knows how to refresh expiring tokens. Refresh is
//! single-flight: concurrent callers that observe an expired token wait on one
//! in-progress refresh and all see its outcome.

use crate::endpoint::WireRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use http::{header, HeaderName, HeaderValue};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

/// Attaches credentials to outgoing requests.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Attaches credentials to `request`, refreshing first if the current
    /// token is past expiry.
    async fn authenticate(&self, request: &mut WireRequest) -> Result<()>;

    /// Obtains fresh credentials. Single-flight: concurrent calls coalesce
    /// onto one real refresh.
    async fn refresh(&self) -> Result<()>;

    /// Returns `true` while usable credentials are held.
    async fn is_valid(&self) -> bool;

    /// Discards all credentials. Idempotent.
    async fn logout(&self);
}

/// A refreshed set of tokens handed back by a [`TokenRefresher`].
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// The new access token.
    pub access_token: String,
    /// A rotated refresh token, when the issuer rotates them.
    pub refresh_token: Option<String>,
    /// Lifetime of the access token.
    pub expires_in: Option<Duration>,
}

/// Application-supplied refresh procedure for [`BearerAuth`].
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchanges the current refresh token for a new grant.
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant>;
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
}

impl TokenState {
    fn is_fresh(&self) -> bool {
        match (&self.access_token, self.expires_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(expires_at)) => Instant::now() < expires_at,
        }
    }
}

/// Shared token storage with a single-flight refresh gate.
struct TokenCell {
    state: Mutex<TokenState>,
    // Held for the duration of a real refresh; waiters re-check freshness
    // after acquiring it and return without refreshing again.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl TokenCell {
    fn new(state: TokenState) -> Self {
        Self {
            state: Mutex::new(state),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn is_fresh(&self) -> bool {
        self.state.lock().unwrap().is_fresh()
    }

    fn access_token(&self) -> Option<String> {
        self.state.lock().unwrap().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.state.lock().unwrap().refresh_token.clone()
    }

    fn install(&self, grant: TokenGrant) {
        let mut state = self.state.lock().unwrap();
        state.access_token = Some(grant.access_token);
        if grant.refresh_token.is_some() {
            state.refresh_token = grant.refresh_token;
        }
        state.expires_at = grant.expires_in.map(|ttl| Instant::now() + ttl);
    }

    fn clear(&self) {
        *self.state.lock().unwrap() = TokenState::default();
    }
}

fn bearer_header(token: &str) -> Result<HeaderValue> {
    HeaderValue::try_from(format!("Bearer {}", token))
        .map_err(|e| Error::InvalidRequest(format!("invalid bearer token: {}", e)))
}

/// Bearer-token authentication with an optional refresh handler.
///
/// # Examples
///
/// ```
/// use caravel::auth::BearerAuth;
///
/// let auth = BearerAuth::new("initial-token");
/// ```
pub struct BearerAuth {
    tokens: TokenCell,
    refresher: Option<Box<dyn TokenRefresher>>,
}

impl BearerAuth {
    /// Creates a bearer authenticator around a static token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            tokens: TokenCell::new(TokenState {
                access_token: Some(access_token.into()),
                refresh_token: None,
                expires_at: None,
            }),
            refresher: None,
        }
    }

    /// Creates a bearer authenticator with an expiring token and a refresh
    /// handler.
    pub fn with_refresh(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Duration,
        refresher: Box<dyn TokenRefresher>,
    ) -> Self {
        Self {
            tokens: TokenCell::new(TokenState {
                access_token: Some(access_token.into()),
                refresh_token: Some(refresh_token.into()),
                expires_at: Some(Instant::now() + expires_in),
            }),
            refresher: Some(refresher),
        }
    }
}

#[async_trait]
impl Authenticator for BearerAuth {
    async fn authenticate(&self, request: &mut WireRequest) -> Result<()> {
        if !self.tokens.is_fresh() {
            self.refresh().await?;
        }
        let token = self
            .tokens
            .access_token()
            .ok_or(Error::AuthenticationRequired)?;
        request.set_header(header::AUTHORIZATION, bearer_header(&token)?);
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        // Single-flight: remember which token we saw; whoever wins the gate
        // replaces it, and everyone who waited sees the replacement and skips.
        // Comparing identity rather than freshness keeps a server-directed
        // refresh (401 on a token that still looks fresh) effective.
        let observed = self.tokens.access_token();
        let _gate = self.tokens.refresh_gate.lock().await;
        if self.tokens.access_token() != observed {
            return Ok(());
        }
        let refresher = self.refresher.as_ref().ok_or(Error::TokenExpired)?;
        let refresh_token = self.tokens.refresh_token();
        match refresher.refresh(refresh_token.as_deref()).await {
            Ok(grant) => {
                self.tokens.install(grant);
                tracing::debug!("bearer token refreshed");
                Ok(())
            }
            Err(Error::TokenRefreshFailed(reason)) => Err(Error::TokenRefreshFailed(reason)),
            Err(e) => Err(Error::TokenRefreshFailed(e.to_string())),
        }
    }

    async fn is_valid(&self) -> bool {
        self.tokens.is_fresh()
    }

    async fn logout(&self) {
        self.tokens.clear();
    }
}

/// API-key authentication: a configurable header with an optional prefix.
pub struct ApiKeyAuth {
    header_name: HeaderName,
    prefix: Option<String>,
    key: String,
    active: AtomicBool,
}

impl ApiKeyAuth {
    /// Creates an API-key authenticator writing `key` into `header_name`.
    pub fn new(header_name: HeaderName, key: impl Into<String>) -> Self {
        Self {
            header_name,
            prefix: None,
            key: key.into(),
            active: AtomicBool::new(true),
        }
    }

    /// Prepends `prefix` (plus a space) to the key on the wire.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuth {
    async fn authenticate(&self, request: &mut WireRequest) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(Error::AuthenticationRequired);
        }
        let value = match &self.prefix {
            Some(prefix) => format!("{} {}", prefix, self.key),
            None => self.key.clone(),
        };
        request.set_header(
            self.header_name.clone(),
            HeaderValue::try_from(value)
                .map_err(|e| Error::InvalidRequest(format!("invalid api key: {}", e)))?,
        );
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        // API keys do not rotate.
        Ok(())
    }

    async fn is_valid(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn logout(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// HTTP Basic authentication.
pub struct BasicAuth {
    username: String,
    password: String,
    active: AtomicBool,
}

impl BasicAuth {
    /// Creates a basic authenticator for the given credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            active: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Authenticator for BasicAuth {
    async fn authenticate(&self, request: &mut WireRequest) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(Error::AuthenticationRequired);
        }
        let encoded = BASE64.encode(format!("{}:{}", self.username, self.password));
        request.set_header(
            header::AUTHORIZATION,
            HeaderValue::try_from(format!("Basic {}", encoded))
                .map_err(|e| Error::InvalidRequest(format!("invalid basic credentials: {}", e)))?,
        );
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn is_valid(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn logout(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Configuration for [`OAuth2Auth`].
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret, for confidential clients.
    pub client_secret: Option<String>,
    /// The token endpoint refresh requests are POSTed to.
    pub token_endpoint: Url,
    /// Requested scopes (used by the initial grant; kept for completeness).
    pub scopes: Vec<String>,
    /// Redirect URI registered with the issuer.
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuth2TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 bearer authentication refreshing via the `refresh_token` grant.
pub struct OAuth2Auth {
    config: OAuth2Config,
    http: reqwest::Client,
    tokens: TokenCell,
}

impl OAuth2Auth {
    /// Creates an OAuth2 authenticator seeded with an existing grant.
    pub fn new(
        config: OAuth2Config,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            tokens: TokenCell::new(TokenState {
                access_token: Some(access_token.into()),
                refresh_token: Some(refresh_token.into()),
                expires_at: Some(Instant::now() + expires_in),
            }),
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(self.config.token_endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::TokenRefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenRefreshFailed(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let grant: OAuth2TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::TokenRefreshFailed(format!("malformed token response: {}", e)))?;
        Ok(TokenGrant {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_in: grant.expires_in.map(Duration::from_secs),
        })
    }
}

#[async_trait]
impl Authenticator for OAuth2Auth {
    async fn authenticate(&self, request: &mut WireRequest) -> Result<()> {
        if !self.tokens.is_fresh() {
            self.refresh().await?;
        }
        let token = self
            .tokens
            .access_token()
            .ok_or(Error::AuthenticationRequired)?;
        request.set_header(header::AUTHORIZATION, bearer_header(&token)?);
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let observed = self.tokens.access_token();
        let _gate = self.tokens.refresh_gate.lock().await;
        if self.tokens.access_token() != observed {
            // Coalesced onto a refresh that completed while we waited.
            return Ok(());
        }
        let refresh_token = self.tokens.refresh_token().ok_or(Error::TokenExpired)?;
        let grant = self.request_refresh(&refresh_token).await?;
        self.tokens.install(grant);
        tracing::debug!(client_id = %self.config.client_id, "oauth2 token refreshed");
        Ok(())
    }

    async fn is_valid(&self) -> bool {
        self.tokens.is_fresh()
    }

    async fn logout(&self) {
        self.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn wire_request() -> WireRequest {
        WireRequest {
            url: Url::parse("https://api.example.com/x").unwrap(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    struct CountingRefresher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: Option<&str>) -> Result<TokenGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Linger so concurrent callers pile up on the gate.
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(TokenGrant {
                access_token: "fresh".to_string(),
                refresh_token: None,
                expires_in: Some(Duration::from_secs(3600)),
            })
        }
    }

    #[tokio::test]
    async fn bearer_attaches_authorization_header() {
        let auth = BearerAuth::new("tok");
        let mut request = wire_request();
        auth.authenticate(&mut request).await.unwrap();
        assert_eq!(
            request.headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer tok"
        );
    }

    #[tokio::test]
    async fn expired_token_refreshes_before_attach() {
        let calls = Arc::new(AtomicUsize::new(0));
        let auth = BearerAuth::with_refresh(
            "stale",
            "refresh-tok",
            Duration::ZERO,
            Box::new(CountingRefresher {
                calls: calls.clone(),
            }),
        );
        let mut request = wire_request();
        auth.authenticate(&mut request).await.unwrap();
        assert_eq!(
            request.headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer fresh"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_refresh_is_single_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let auth = Arc::new(BearerAuth::with_refresh(
            "stale",
            "refresh-tok",
            Duration::ZERO,
            Box::new(CountingRefresher {
                calls: calls.clone(),
            }),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let auth = auth.clone();
            handles.push(tokio::spawn(async move {
                let mut request = wire_request();
                auth.authenticate(&mut request).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_without_refresher_fails() {
        let auth = BearerAuth {
            tokens: TokenCell::new(TokenState {
                access_token: Some("stale".to_string()),
                refresh_token: None,
                expires_at: Some(Instant::now() - Duration::from_secs(1)),
            }),
            refresher: None,
        };
        let mut request = wire_request();
        assert!(matches!(
            auth.authenticate(&mut request).await,
            Err(Error::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let auth = BearerAuth::new("tok");
        assert!(auth.is_valid().await);
        auth.logout().await;
        auth.logout().await;
        assert!(!auth.is_valid().await);
    }

    #[tokio::test]
    async fn api_key_prefix_and_header() {
        let auth = ApiKeyAuth::new(HeaderName::from_static("x-api-key"), "secret")
            .with_prefix("Key");
        let mut request = wire_request();
        auth.authenticate(&mut request).await.unwrap();
        assert_eq!(request.headers.get("x-api-key").unwrap(), "Key secret");

        auth.logout().await;
        assert!(matches!(
            auth.authenticate(&mut wire_request()).await,
            Err(Error::AuthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn basic_auth_encodes_credentials() {
        let auth = BasicAuth::new("user", "password");
        let mut request = wire_request();
        auth.authenticate(&mut request).await.unwrap();
        assert_eq!(
            request.headers.get(header::AUTHORIZATION).unwrap(),
            "Basic dXNlcjpwYXNzd29yZA=="
        );
    }
}
