//! Transport abstraction: one request in, one response out.
//!
//! The client only needs status, headers, and a body it can choose not to
//! read. Implementations may use real HTTP ([`HttpFetch`]) or anything else
//! (see [`crate::memory`]).

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method, StatusCode};

use crate::error::{ClientError, Result};

/// A request to send.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::HEAD,
            url: url.into(),
            body: None,
        }
    }

    pub fn put(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: Method::PUT,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// A response whose body has not been read yet.
///
/// Callers inspect status and headers first and only then decide whether to
/// buffer the body with [`FetchResponse::bytes`].
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: BoxFuture<'static, Result<Bytes>>,
}

impl FetchResponse {
    /// Create a response with a lazily read body.
    pub fn new<F>(status: StatusCode, headers: HeaderMap, body: F) -> Self
    where
        F: Future<Output = Result<Bytes>> + Send + 'static,
    {
        Self {
            status,
            headers,
            body: body.boxed(),
        }
    }

    /// Create a response whose body is already in memory.
    pub fn buffered(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self::new(status, headers, futures_util::future::ready(Ok(body)))
    }

    /// A header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The declared `Content-Length`, if any.
    pub fn content_length(&self) -> std::result::Result<Option<u64>, String> {
        match self.headers.get(CONTENT_LENGTH) {
            None => Ok(None),
            Some(value) => value
                .to_str()
                .map_err(|e| e.to_string())?
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: std::num::ParseIntError| e.to_string()),
        }
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        self.body.await
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends requests to servers.
///
/// Implementations must be thread-safe (Send + Sync). They make exactly one
/// attempt per call; retrying is up to the caller.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetch {
    http_client: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let mut builder = self
            .http_client
            .request(request.method, request.url.as_str());
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        Ok(FetchResponse::new(status, headers, async move {
            response
                .bytes()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))
        }))
    }
}
