//! Request bodies and the codec seam.
//!
//! The engine is codec-agnostic: structured payloads are captured as a
//! [`serde_json::Value`] at the call site (where the `Serialize` bound is
//! enforced) and turned into wire bytes by the engine's [`Codec`]. Raw, form,
//! and multipart bodies encode deterministically without a codec.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use uuid::Uuid;

/// Encodes structured values to wire bytes and decodes response bytes back.
///
/// Implementations must be stateless and cheap to share. The engine holds one
/// default codec; JSON is provided via [`JsonCodec`].
pub trait Codec: Send + Sync {
    /// The `Content-Type` produced by [`Codec::encode`].
    fn content_type(&self) -> &'static str;

    /// Encodes a structured value into body bytes.
    fn encode(&self, value: &serde_json::Value) -> Result<Bytes>;

    /// Decodes response bytes into a structured value.
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value>;
}

/// The default JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::EncodingFailed(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        serde_json::from_slice(bytes).map_err(|e| Error::DecodingFailed {
            raw_body: String::from_utf8_lossy(bytes).into_owned(),
            reason: e.to_string(),
            status: http::StatusCode::OK,
        })
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct Part {
    /// The form field name.
    pub name: String,
    /// The part's payload.
    pub bytes: Bytes,
    /// Optional file name, rendered into `Content-Disposition`.
    pub filename: Option<String>,
    /// Optional media type, rendered as a part-level `Content-Type`.
    pub content_type: Option<String>,
}

impl Part {
    /// Creates a plain field part.
    pub fn field(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            filename: None,
            content_type: None,
        }
    }

    /// Creates a file part with a filename and media type.
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
        }
    }
}

/// The body of a request, as described by an [`crate::Endpoint`].
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// A structured payload, encoded by the engine's [`Codec`].
    Structured(serde_json::Value),
    /// Pre-encoded bytes with an explicit media type.
    Raw {
        /// The body bytes.
        bytes: Bytes,
        /// The media type sent as `Content-Type`.
        content_type: String,
    },
    /// `application/x-www-form-urlencoded` key/value pairs, in order.
    FormUrlEncoded(Vec<(String, String)>),
    /// An RFC 7578 multipart body; parts keep their insertion order.
    Multipart(Vec<Part>),
}

impl RequestBody {
    /// Captures a serializable value as a structured body.
    ///
    /// The `Serialize + Send` bound is enforced here, at the boundary, so the
    /// rest of the pipeline only ever sees an owned value.
    pub fn structured<T: Serialize + Send>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| Error::EncodingFailed(e.to_string()))?;
        Ok(RequestBody::Structured(value))
    }

    /// Wraps pre-encoded bytes with a media type.
    pub fn raw(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        RequestBody::Raw {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Encodes this body to wire bytes plus its `Content-Type`.
    ///
    /// Encoding is deterministic except for the multipart boundary, which is
    /// freshly generated per invocation.
    pub fn encode(&self, codec: &dyn Codec) -> Result<EncodedBody> {
        match self {
            RequestBody::Structured(value) => Ok(EncodedBody {
                bytes: codec.encode(value)?,
                content_type: codec.content_type().to_string(),
            }),
            RequestBody::Raw {
                bytes,
                content_type,
            } => Ok(EncodedBody {
                bytes: bytes.clone(),
                content_type: content_type.clone(),
            }),
            RequestBody::FormUrlEncoded(pairs) => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (key, value) in pairs {
                    serializer.append_pair(key, value);
                }
                Ok(EncodedBody {
                    bytes: Bytes::from(serializer.finish().into_bytes()),
                    content_type: "application/x-www-form-urlencoded".to_string(),
                })
            }
            RequestBody::Multipart(parts) => {
                let boundary = format!("caravel-{}", Uuid::new_v4().simple());
                let bytes = encode_multipart(parts, &boundary)?;
                Ok(EncodedBody {
                    bytes,
                    content_type: format!("multipart/form-data; boundary={}", boundary),
                })
            }
        }
    }
}

/// Encoded wire bytes plus their media type.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// The encoded body bytes.
    pub bytes: Bytes,
    /// The value for the `Content-Type` header.
    pub content_type: String,
}

fn encode_multipart(parts: &[Part], boundary: &str) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    for part in parts {
        if part.name.is_empty() {
            return Err(Error::EncodingFailed(
                "multipart part name must not be empty".to_string(),
            ));
        }
        buf.put_slice(b"--");
        buf.put_slice(boundary.as_bytes());
        buf.put_slice(b"\r\n");
        match &part.filename {
            Some(filename) => buf.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.name, filename
                )
                .as_bytes(),
            ),
            None => buf.put_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
            ),
        }
        if let Some(content_type) = &part.content_type {
            buf.put_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&part.bytes);
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(b"--\r\n");
    Ok(buf.freeze())
}
