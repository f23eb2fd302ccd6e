//! Error types for the REST client.
//!
//! # Design
//! Configuration problems (no codec, unknown media type) get dedicated
//! variants so callers can tell them apart from payload failures. A
//! non-success status lands in [`HttpError`], which keeps the whole
//! [`Response`] (and through it the originating request) instead of copying
//! status, method and URL.

use std::fmt;

use thiserror::Error;

use crate::codec::CodecError;
use crate::http::{HttpMethod, Response, TransportError};

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint or request path is not a valid URL.
    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The request input could not be serialized.
    #[error("encoding failed: {0}")]
    Encoding(#[source] CodecError),

    /// The response body could not be deserialized into the output.
    #[error("decoding failed: {0}")]
    Decoding(#[source] CodecError),

    /// No encoder override is set and no registered format matches the
    /// client's headers.
    #[error("could not determine an available encoder; set a client encoder override")]
    NoEncoderAvailable,

    /// No decoder override is set and no registered format matches the
    /// client's headers.
    #[error("could not determine an available decoder; set a client decoder override")]
    NoDecoderAvailable,

    /// The media type parsed but names no known format.
    #[error("could not determine the format from media type {0:?}")]
    UnresolvedFormat(String),

    #[error("malformed media type {media_type:?}: {source}")]
    MalformedMediaType {
        media_type: String,
        #[source]
        source: mime::FromStrError,
    },

    #[error("invalid header: {0}")]
    InvalidHeader(#[from] http::Error),

    /// Query options could not be encoded.
    #[error("query encoding failed: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),

    /// The server answered with a status classified as an error.
    #[error(transparent)]
    Http(Box<HttpError>),

    /// Connection-level failure, passed through from the transport.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl Error {
    /// The failed response, when this is an HTTP status error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::Http(e) => Some(&e.response),
            _ => None,
        }
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Error::Http(Box::new(e))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Error::InvalidHeader(e.into())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeader(e.into())
    }
}

/// A response whose status code is classified as an error.
///
/// The body is buffered so it can be inspected after the transport's
/// reader has been released; it is never decoded.
#[derive(Debug)]
pub struct HttpError {
    pub response: Response,
    pub body: Vec<u8>,
}

impl HttpError {
    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn method(&self) -> &HttpMethod {
        &self.response.request.method
    }

    pub fn url(&self) -> &url::Url {
        &self.response.request.url
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.method(), self.url(), self.status())
    }
}

impl std::error::Error for HttpError {}
