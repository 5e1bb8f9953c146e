//! Interceptor middleware over the request pipeline.
//!
//! Interceptors see the assembled [`WireRequest`] before dispatch and the
//! [`RawResponse`] after a successful call. Pre-request hooks run in
//! registration order; post-response hooks run in reverse registration order,
//! so the first-registered interceptor wraps the whole exchange.
//!
//! Hooks must not retain handles to the engine's cache or queue; cross-cutting
//! state belongs in [`RequestContext::metadata`].

use crate::context::RequestContext;
use crate::endpoint::WireRequest;
use crate::response::RawResponse;
use crate::Result;
use async_trait::async_trait;

/// A middleware hook over requests and responses.
///
/// Both hooks default to no-ops, so an interceptor can implement only the
/// side it cares about. A hook error aborts the call with that error.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use caravel::{Interceptor, RequestContext, WireRequest};
/// use http::{HeaderName, HeaderValue};
///
/// struct ClientVersion;
///
/// #[async_trait]
/// impl Interceptor for ClientVersion {
///     async fn on_request(
///         &self,
///         request: &mut WireRequest,
///         _ctx: &RequestContext,
///     ) -> Result<(), caravel::Error> {
///         request.set_header(
///             HeaderName::from_static("x-client-version"),
///             HeaderValue::from_static("1.0"),
///         );
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Runs before the request is dispatched. May mutate the wire request.
    async fn on_request(&self, request: &mut WireRequest, ctx: &RequestContext) -> Result<()> {
        let _ = (request, ctx);
        Ok(())
    }

    /// Runs after a response arrives, before decoding. May mutate the raw
    /// response.
    async fn on_response(&self, response: &mut RawResponse, ctx: &RequestContext) -> Result<()> {
        let _ = (response, ctx);
        Ok(())
    }
}

/// Runs the pre-request hooks in registration order.
pub(crate) async fn run_request_interceptors(
    interceptors: &[std::sync::Arc<dyn Interceptor>],
    request: &mut WireRequest,
    ctx: &RequestContext,
) -> Result<()> {
    for interceptor in interceptors {
        interceptor.on_request(request, ctx).await?;
    }
    Ok(())
}

/// Runs the post-response hooks in reverse registration order.
pub(crate) async fn run_response_interceptors(
    interceptors: &[std::sync::Arc<dyn Interceptor>],
    response: &mut RawResponse,
    ctx: &RequestContext,
) -> Result<()> {
    for interceptor in interceptors.iter().rev() {
        interceptor.on_response(response, ctx).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
    use std::sync::Arc;
    use url::Url;

    struct Tagger(&'static str);

    #[async_trait]
    impl Interceptor for Tagger {
        async fn on_request(&self, request: &mut WireRequest, _ctx: &RequestContext) -> Result<()> {
            let trail = match request.headers.get("x-trail") {
                Some(prev) => format!("{},{}", prev.to_str().unwrap(), self.0),
                None => self.0.to_string(),
            };
            request.set_header(
                HeaderName::from_static("x-trail"),
                HeaderValue::try_from(trail).unwrap(),
            );
            Ok(())
        }

        async fn on_response(
            &self,
            response: &mut RawResponse,
            _ctx: &RequestContext,
        ) -> Result<()> {
            let trail = match response.headers.get("x-trail") {
                Some(prev) => format!("{},{}", prev.to_str().unwrap(), self.0),
                None => self.0.to_string(),
            };
            response.headers.insert(
                HeaderName::from_static("x-trail"),
                HeaderValue::try_from(trail).unwrap(),
            );
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Interceptor for Failing {
        async fn on_request(&self, _: &mut WireRequest, _: &RequestContext) -> Result<()> {
            Err(Error::InvalidRequest("interceptor rejected".to_string()))
        }
    }

    fn wire_request() -> WireRequest {
        WireRequest {
            url: Url::parse("https://api.example.com/x").unwrap(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    fn raw_response() -> RawResponse {
        RawResponse {
            bytes: Bytes::new(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            url: Url::parse("https://api.example.com/x").unwrap(),
        }
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let mut request = wire_request();
        let before = request.headers.clone();
        run_request_interceptors(&[], &mut request, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(request.headers, before);
    }

    #[tokio::test]
    async fn pre_hooks_run_in_registration_order() {
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(Tagger("a")), Arc::new(Tagger("b"))];
        let mut request = wire_request();
        run_request_interceptors(&chain, &mut request, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(request.headers.get("x-trail").unwrap(), "a,b");
    }

    #[tokio::test]
    async fn post_hooks_run_in_reverse_order() {
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(Tagger("a")), Arc::new(Tagger("b"))];
        let mut response = raw_response();
        run_response_interceptors(&chain, &mut response, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(response.headers.get("x-trail").unwrap(), "b,a");
    }

    #[tokio::test]
    async fn hook_error_aborts_the_chain() {
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(Failing), Arc::new(Tagger("after"))];
        let mut request = wire_request();
        let result = run_request_interceptors(&chain, &mut request, &RequestContext::new()).await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
        assert!(request.headers.get("x-trail").is_none());
    }
}
