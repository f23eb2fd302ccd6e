//! HTTP request/response types and the transport seam.
//!
//! # Design
//! Requests and responses are described as plain data. The client builds an
//! `HttpRequest`, hands it to a [`Transport`], and interprets the
//! `TransportResponse` it gets back. Everything a request carries is owned,
//! so changing a client's configuration never reaches a request that has
//! already been built.

use std::fmt;
use std::io::Read;

use http::HeaderMap;
use url::Url;

/// Error produced by a transport. Passed through to the caller unchanged.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound request described as plain data.
///
/// Built by [`Client::new_request`](crate::Client::new_request). `body` is
/// empty when the operation had no input.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// What a transport returns for an executed request.
///
/// `status` is 0 when the transport has no status to report. The body
/// reader is released when the value is dropped.
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Box<dyn Read>,
}

impl TransportResponse {
    /// Response with an in-memory body.
    pub fn from_bytes(status: u16, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: Box::new(std::io::Cursor::new(body.into())),
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Response metadata returned by every client operation.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    /// The request that produced this response.
    pub request: HttpRequest,
}

/// Executes requests on behalf of a [`Client`](crate::Client).
///
/// Timeouts, pooling and TLS belong to the implementation; the client adds
/// none of its own.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Whether a status code is reported as an [`HttpError`](crate::HttpError).
///
/// 2xx, 304 and 0 (no status from the transport) are not errors.
pub fn is_error_status(status: u16) -> bool {
    !matches!(status, 0 | 200..=299 | 304)
}
