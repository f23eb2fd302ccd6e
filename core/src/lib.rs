//! Generic synchronous HTTP API client core.
//!
//! # Overview
//! A [`Client`] is bound to a base endpoint and carries default headers,
//! default query parameters and optional codec overrides. Each verb
//! operation builds an [`HttpRequest`], executes it through a [`Transport`]
//! and classifies the response, decoding successful bodies into the
//! caller's output.
//!
//! # Design
//! - Request and response values are plain owned data so the I/O boundary
//!   stays explicit; [`UreqTransport`] is the default blocking transport.
//! - Body formats are pluggable: a [`CodecRegistry`] maps format names
//!   ("json", "xml", ...) to encoder/decoder constructors, and the format for
//!   a request is resolved from the client's `Accept` / `Content-Type`
//!   headers by [`media_type`].
//! - What happens to a successful body is decided at compile time through
//!   the [`Output`] trait: `()` skips it, `&mut T` decodes it, [`Raw`] copies
//!   it verbatim.

pub mod client;
pub mod codec;
pub mod error;
pub mod http;
pub mod media_type;
pub mod options;
pub mod transport;

pub use client::{Client, Output, Raw};
pub use codec::{register_decoder, register_encoder, CodecRegistry, Decoder, Encoder};
pub use error::{Error, HttpError, Result};
pub use http::{is_error_status, HttpMethod, HttpRequest, Response, Transport, TransportResponse};
pub use options::{add_options, basic_auth};
pub use transport::{TransportConfig, UreqTransport};
