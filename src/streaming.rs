//! Streaming transport adapter: a pull-based byte-chunk source.
//!
//! Protocol frontends (SSE, WebSocket upgrade bodies, long downloads) consume
//! response bodies lazily instead of buffering them. The adapter validates the
//! response headers up front, then yields chunks as they arrive. Dropping the
//! stream closes the underlying transport; reconnection policy belongs to the
//! frontend.

use crate::{Error, Result};
use bytes::Bytes;
use futures::Stream;
use http::{header, HeaderMap, StatusCode};
use std::pin::Pin;
use std::task::{Context, Poll};
use url::Url;

/// A lazy byte-chunk source over one HTTP response body.
///
/// Implements [`futures::Stream`]; each item is one body chunk. The stream
/// owns the transport connection and releases it on drop.
pub struct ByteStream {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
}

impl ByteStream {
    /// Validates `response` and wraps its body as a chunk stream.
    ///
    /// The status must be 2xx; when `expected_content_type` is given (e.g.
    /// `text/event-stream` for SSE) the response `Content-Type` must match it.
    pub(crate) async fn from_response(
        response: reqwest::Response,
        expected_content_type: Option<&str>,
    ) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = Url::parse(response.url().as_str())?;

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, body, None));
        }

        if let Some(expected) = expected_content_type {
            let actual = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !actual.starts_with(expected) {
                return Err(Error::InvalidResponse(format!(
                    "expected content type {}, got {}",
                    expected,
                    if actual.is_empty() { "none" } else { actual }
                )));
            }
        }

        Ok(Self {
            status,
            headers,
            url,
            inner: Box::pin(response.bytes_stream()),
        })
    }

    /// The validated response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL the stream was served from.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Error::from_transport(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}
