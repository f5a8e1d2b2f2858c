//! The small HTTP transport contract this core consumes (§6's "Transport
//! contract"). Generalized from the teacher's `core::request::{HttpResponse,
//! BufferedHttpResponse, DispatchSignedRequest}` (not present in this
//! retrieval, but referenced throughout the teacher's `core::proto::json`
//! files, which fixes `BufferedHttpResponse`'s shape) so callers can plug
//! in any transport rather than hard-requiring hyper.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::signature::SignedRequest;
use crate::streaming::ByteStream;

/// Request/response body: either a fully materialized buffer, or an async
/// byte sequence with an optional known length (§3's `HttpBody`).
pub enum HttpBody {
    Buffer(Bytes),
    Streaming(ByteStream, Option<u64>),
}

impl HttpBody {
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            HttpBody::Buffer(b) => Some(b.len() as u64),
            HttpBody::Streaming(_, len) => *len,
        }
    }
}

impl fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HttpBody::Buffer(b) => write!(f, "HttpBody::Buffer({} bytes)", b.len()),
            HttpBody::Streaming(_, len) => write!(f, "HttpBody::Streaming(len_hint={:?})", len),
        }
    }
}

/// A response whose body is still an async sequence (not yet collated).
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ByteStream,
}

/// A response whose body has been fully read into memory — what C7's
/// pipeline actually operates on.
#[derive(Debug, Clone)]
pub struct BufferedHttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl BufferedHttpResponse {
    pub fn body_as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Failure dispatching a request over the transport: connection refused,
/// timed out, TLS failure, or I/O error reading/writing the body.
#[derive(Debug)]
pub enum HttpDispatchError {
    Timeout,
    Io(io::Error),
    Other(String),
}

impl fmt::Display for HttpDispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HttpDispatchError::Timeout => write!(f, "request timed out"),
            HttpDispatchError::Io(e) => write!(f, "transport i/o error: {}", e),
            HttpDispatchError::Other(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl StdError for HttpDispatchError {}

impl From<io::Error> for HttpDispatchError {
    fn from(err: io::Error) -> Self {
        HttpDispatchError::Io(err)
    }
}

/// Transport contract: dispatch an already-signed request and return the
/// raw (still-streaming) response. `shutdown` releases any pooled
/// connections and must be called before process exit (§5's lifecycle
/// invariant).
#[async_trait]
pub trait DispatchSignedRequest: Send + Sync {
    async fn execute(
        &self,
        request: SignedRequest,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpDispatchError>;

    async fn shutdown(&self);
}

/// Reads an `HttpResponse`'s streaming body to completion, producing the
/// `BufferedHttpResponse` the response pipeline (C7) operates on.
pub async fn collate(response: HttpResponse) -> Result<BufferedHttpResponse, HttpDispatchError> {
    use futures::StreamExt;
    let HttpResponse { status, headers, mut body } = response;
    let mut buf = bytes::BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(HttpDispatchError::Io)?;
        buf.extend_from_slice(&chunk);
    }
    Ok(BufferedHttpResponse {
        status,
        headers,
        body: buf.freeze(),
    })
}
