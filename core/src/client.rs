//! REST client bound to a base endpoint.
//!
//! # Design
//! `Client` owns its configuration: endpoint, default headers, default query
//! parameters and optional codec overrides. Each verb builds an
//! [`HttpRequest`] with [`Client::new_request`] and runs it with
//! [`Client::execute`], which classifies the status and hands successful
//! bodies to the caller's [`Output`].
//!
//! Configuration is mutated through `&mut self` and read through `&self`,
//! so changing headers while a request is in flight on the same client is
//! ruled out by the borrow checker. Requests copy the headers they need.

use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, PoisonError};

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::codec::{CodecRegistry, Decoder, DecoderFn, Encoder, EncoderFn};
use crate::error::{Error, HttpError, Result};
use crate::http::{is_error_status, HttpMethod, HttpRequest, Response, Transport, TransportResponse};
use crate::options::basic_auth;

/// Synchronous REST client.
///
/// Paths passed to the verb methods are resolved against the endpoint
/// like relative links: `users/42` appends to the endpoint path, `/v2/users`
/// replaces it.
pub struct Client {
    transport: Box<dyn Transport>,
    endpoint: Url,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    registry: Option<Arc<CodecRegistry>>,
    encoder_override: Option<EncoderFn>,
    decoder_override: Option<DecoderFn>,
}

impl Client {
    /// Parse `endpoint` and build a client around `transport`.
    pub fn new(endpoint: &str, transport: impl Transport + 'static) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        Ok(Self::from_url(endpoint, transport))
    }

    /// Build a client from a parsed endpoint.
    ///
    /// The endpoint path gets a trailing `/` so relative paths append to it.
    /// Its query pairs become the client's default query parameters.
    pub fn from_url(mut endpoint: Url, transport: impl Transport + 'static) -> Self {
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let query = endpoint.query_pairs().into_owned().collect();
        endpoint.set_query(None);

        Self {
            transport: Box::new(transport),
            endpoint,
            headers: HeaderMap::new(),
            query,
            registry: None,
            encoder_override: None,
            decoder_override: None,
        }
    }

    /// Use `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Replace every value of `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Add `value` to the values of `name`.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn set_basic_auth(&mut self, username: &str, password: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Basic {}", basic_auth(username, password)))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Default query parameters, added to requests that do not set the key.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Vec<(String, String)> {
        &mut self.query
    }

    /// Replace every default value of `key` with `value`.
    pub fn set_query(&mut self, key: &str, value: &str) {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.to_string()));
    }

    /// Encode every request body with `ctor`, skipping format resolution.
    pub fn set_encoder_override<F>(&mut self, ctor: F)
    where
        F: for<'w> Fn(&'w mut dyn Write) -> Box<dyn Encoder + 'w> + Send + Sync + 'static,
    {
        self.encoder_override = Some(Arc::new(ctor));
    }

    /// Decode every response body with `ctor`, skipping format resolution.
    pub fn set_decoder_override<F>(&mut self, ctor: F)
    where
        F: for<'r> Fn(&'r mut dyn Read) -> Box<dyn Decoder + 'r> + Send + Sync + 'static,
    {
        self.decoder_override = Some(Arc::new(ctor));
    }

    pub fn clear_overrides(&mut self) {
        self.encoder_override = None;
        self.decoder_override = None;
    }

    /// Build a request for `path`, encoding `input` into the body.
    ///
    /// No I/O happens here. The request holds a copy of the client's headers.
    pub fn new_request<I: Serialize>(&self, method: HttpMethod, path: &str, input: Option<&I>) -> Result<HttpRequest> {
        let mut url = self.endpoint.join(path)?;
        self.apply_default_query(&mut url);

        let body = match input {
            Some(input) => self.encode(input)?,
            None => Vec::new(),
        };

        Ok(HttpRequest {
            method,
            url,
            headers: self.headers.clone(),
            body,
        })
    }

    fn apply_default_query(&self, url: &mut Url) {
        let present: HashSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        let missing: Vec<&(String, String)> = self.query.iter().filter(|(k, _)| !present.contains(k)).collect();
        if missing.is_empty() {
            return;
        }
        let mut pairs = url.query_pairs_mut();
        for (key, value) in missing {
            pairs.append_pair(key, value);
        }
    }

    /// Serialize `input` with the override encoder, or the format named by
    /// the client's `Content-Type` (falling back to `Accept`).
    pub fn encode<I: Serialize>(&self, input: &I) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let sink: &mut dyn Write = &mut buf;

        if let Some(ctor) = &self.encoder_override {
            ctor(sink).encode(input).map_err(Error::Encoding)?;
            return Ok(buf);
        }

        let media_type = self
            .client_media_type(&[CONTENT_TYPE, ACCEPT])
            .ok_or(Error::NoEncoderAvailable)?;
        let ctor = self.with_codecs(|registry| -> Result<EncoderFn> {
            let format = resolve_format(registry, media_type, Error::NoEncoderAvailable)?;
            registry.encoder_fn(format).ok_or(Error::NoEncoderAvailable)
        })?;
        ctor(sink).encode(input).map_err(Error::Encoding)?;
        Ok(buf)
    }

    /// Deserialize a response body with the override decoder, or the format
    /// named by the client's `Accept`, the client's `Content-Type`, or the
    /// response's `Content-Type`, in that order.
    pub fn decode<T: DeserializeOwned>(&self, body: &mut dyn Read, response_headers: &HeaderMap) -> Result<T> {
        if let Some(ctor) = &self.decoder_override {
            return ctor(body).decode().map_err(Error::Decoding);
        }

        let media_type = self
            .client_media_type(&[ACCEPT, CONTENT_TYPE])
            .or_else(|| header_str(response_headers, &CONTENT_TYPE))
            .ok_or(Error::NoDecoderAvailable)?;
        let ctor = self.with_codecs(|registry| -> Result<DecoderFn> {
            let format = resolve_format(registry, media_type, Error::NoDecoderAvailable)?;
            registry.decoder_fn(format).ok_or(Error::NoDecoderAvailable)
        })?;
        let value = ctor(body).decode().map_err(Error::Decoding)?;
        Ok(value)
    }

    fn client_media_type(&self, names: &[HeaderName]) -> Option<&str> {
        names.iter().find_map(|name| header_str(&self.headers, name))
    }

    /// Run a lookup against the owned registry or the global one. The global
    /// read lock is released when `f` returns.
    fn with_codecs<R>(&self, f: impl FnOnce(&CodecRegistry) -> R) -> R {
        match &self.registry {
            Some(registry) => f(registry.as_ref()),
            None => {
                let registry = CodecRegistry::global().read().unwrap_or_else(PoisonError::into_inner);
                f(&*registry)
            }
        }
    }

    /// Execute `request` and deliver a successful body to `output`.
    ///
    /// A status outside 2xx/304/0 yields [`Error::Http`]; the body is then
    /// buffered into the error (up to 1 MiB) and not decoded. `output` is not
    /// touched for 204 and 304. The transport's body reader is dropped before
    /// this returns, whatever the outcome.
    pub fn execute<O: Output>(&self, request: HttpRequest, output: O) -> Result<Response> {
        let TransportResponse {
            status,
            headers,
            mut body,
        } = self.transport.execute(&request).map_err(Error::Transport)?;
        debug!(method = %request.method, url = %request.url, status, "request completed");

        let response = Response {
            status,
            headers,
            request,
        };

        if is_error_status(status) {
            let mut buffered = Vec::new();
            if let Err(e) = body.by_ref().take(MAX_ERROR_BODY).read_to_end(&mut buffered) {
                debug!(error = %e, "failed to read error response body");
            }
            return Err(HttpError {
                response,
                body: buffered,
            }
            .into());
        }

        if has_no_body(status) {
            return Ok(response);
        }
        output.receive(ResponseBody {
            client: self,
            reader: &mut *body,
            headers: &response.headers,
        })?;
        Ok(response)
    }

    pub fn get<O: Output>(&self, path: &str, output: O) -> Result<Response> {
        let request = self.new_request::<()>(HttpMethod::Get, path, None)?;
        self.execute(request, output)
    }

    pub fn post<I: Serialize, O: Output>(&self, path: &str, input: Option<&I>, output: O) -> Result<Response> {
        let request = self.new_request(HttpMethod::Post, path, input)?;
        self.execute(request, output)
    }

    pub fn put<I: Serialize, O: Output>(&self, path: &str, input: Option<&I>, output: O) -> Result<Response> {
        let request = self.new_request(HttpMethod::Put, path, input)?;
        self.execute(request, output)
    }

    pub fn delete<I: Serialize, O: Output>(&self, path: &str, input: Option<&I>, output: O) -> Result<Response> {
        let request = self.new_request(HttpMethod::Delete, path, input)?;
        self.execute(request, output)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint.as_str())
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("registry", &self.registry)
            .field("encoder_override", &self.encoder_override.is_some())
            .field("decoder_override", &self.decoder_override.is_some())
            .finish()
    }
}

/// Bytes of an error response kept in [`HttpError::body`].
const MAX_ERROR_BODY: u64 = 1024 * 1024;

/// 204 and 304 responses never carry a body, so outputs are left untouched.
fn has_no_body(status: u16) -> bool {
    matches!(status, 204 | 304)
}

/// Media type carried by a header, if set and non-empty. `Accept` may list
/// several ranges; only the first is used.
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    let mut value = headers.get(name)?.to_str().ok()?;
    if *name == ACCEPT {
        value = value.split(',').next()?;
    }
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Resolve against the registry in use. A media type naming a known format
/// the registry has no codec for reports `missing` instead of
/// [`Error::UnresolvedFormat`].
fn resolve_format<'r>(registry: &'r CodecRegistry, media_type: &str, missing: Error) -> Result<&'r str> {
    registry.resolve(media_type).map_err(|err| match err {
        Error::UnresolvedFormat(_) if crate::media_type::media_type_format(media_type).is_ok() => missing,
        err => err,
    })
}

/// A successful response body, handed to an [`Output`].
pub struct ResponseBody<'a> {
    client: &'a Client,
    reader: &'a mut dyn Read,
    headers: &'a HeaderMap,
}

impl ResponseBody<'_> {
    pub fn headers(&self) -> &HeaderMap {
        self.headers
    }

    /// Decode the body with the client's resolved decoder.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        self.client.decode(self.reader, self.headers)
    }

    /// Copy the body verbatim. Copy failures are not reported.
    pub fn copy_to(self, writer: &mut dyn Write) {
        if let Err(e) = std::io::copy(self.reader, writer) {
            debug!(error = %e, "raw body copy failed");
        }
    }
}

/// Destination for a successful response body.
///
/// - `()` and `None` take nothing; the body is not decoded.
/// - `&mut T` is overwritten with the decoded body.
/// - [`Raw`] receives the bytes without decoding.
pub trait Output {
    fn receive(self, body: ResponseBody<'_>) -> Result<()>;
}

impl Output for () {
    fn receive(self, _: ResponseBody<'_>) -> Result<()> {
        Ok(())
    }
}

impl<O: Output> Output for Option<O> {
    fn receive(self, body: ResponseBody<'_>) -> Result<()> {
        match self {
            Some(output) => output.receive(body),
            None => Ok(()),
        }
    }
}

impl<T: DeserializeOwned> Output for &mut T {
    fn receive(self, body: ResponseBody<'_>) -> Result<()> {
        *self = body.decode()?;
        Ok(())
    }
}

/// Raw byte sink: the body is copied into `W` as is.
#[derive(Debug)]
pub struct Raw<W>(pub W);

impl<W: Write> Output for Raw<W> {
    fn receive(mut self, body: ResponseBody<'_>) -> Result<()> {
        body.copy_to(&mut self.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::codec::CodecError;

    /// Records requests and answers each one with a canned response.
    struct Canned {
        status: u16,
        content_type: Option<&'static str>,
        body: &'static str,
        seen: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl Canned {
        fn new(status: u16, content_type: Option<&'static str>, body: &'static str) -> Self {
            Self {
                status,
                content_type,
                body,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> std::result::Result<TransportResponse, crate::http::TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let mut headers = HeaderMap::new();
            if let Some(ct) = self.content_type {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
            }
            Ok(TransportResponse::from_bytes(self.status, headers, self.body))
        }
    }

    struct Refused;

    impl Transport for Refused {
        fn execute(&self, _: &HttpRequest) -> std::result::Result<TransportResponse, crate::http::TransportError> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused").into())
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct User {
        login: String,
        name: String,
    }

    fn json_client(transport: impl Transport + 'static) -> Client {
        let mut client = Client::new("https://api.example.com/v1", transport).unwrap();
        client.set_header("Accept", "application/json").unwrap();
        client.set_header("Content-Type", "application/json").unwrap();
        client
    }

    #[test]
    fn endpoint_gains_trailing_slash() {
        let client = Client::new("https://api.example.com/v1", Refused).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://api.example.com/v1/");
    }

    #[test]
    fn bad_endpoint_is_url_error() {
        let err = Client::new("not a url", Refused).unwrap_err();
        assert!(matches!(err, Error::UrlParse(_)));
    }

    #[test]
    fn relative_path_appends_to_endpoint() {
        let client = Client::new("https://api.example.com/v1/", Refused).unwrap();
        let req = client.new_request::<()>(HttpMethod::Get, "users/42", None).unwrap();
        assert_eq!(req.url.as_str(), "https://api.example.com/v1/users/42");
    }

    #[test]
    fn absolute_path_replaces_endpoint_path() {
        let client = Client::new("https://api.example.com/v1/", Refused).unwrap();
        let req = client.new_request::<()>(HttpMethod::Get, "/v2/users/42", None).unwrap();
        assert_eq!(req.url.as_str(), "https://api.example.com/v2/users/42");
    }

    #[test]
    fn dot_segments_are_honoured() {
        let client = Client::new("https://api.example.com/v1/", Refused).unwrap();
        let req = client.new_request::<()>(HttpMethod::Get, "../v3/./users", None).unwrap();
        assert_eq!(req.url.as_str(), "https://api.example.com/v3/users");
    }

    #[test]
    fn endpoint_query_becomes_default() {
        let client = Client::new("https://api.example.com/v1/?api_key=abc", Refused).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://api.example.com/v1/");

        let req = client.new_request::<()>(HttpMethod::Get, "users", None).unwrap();
        assert_eq!(req.url.as_str(), "https://api.example.com/v1/users?api_key=abc");

        let req = client.new_request::<()>(HttpMethod::Get, "users?api_key=xyz", None).unwrap();
        assert_eq!(req.url.as_str(), "https://api.example.com/v1/users?api_key=xyz");
    }

    #[test]
    fn set_query_replaces_existing_key() {
        let mut client = Client::new("https://api.example.com/", Refused).unwrap();
        client.set_query("page", "1");
        client.set_query("page", "2");
        assert_eq!(client.query(), [("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn no_input_means_empty_body() {
        let client = json_client(Canned::new(200, None, ""));
        let req = client.new_request::<User>(HttpMethod::Post, "users", None).unwrap();
        assert!(req.body.is_empty());
    }

    #[test]
    fn input_is_encoded_with_content_type_format() {
        let client = json_client(Canned::new(200, None, ""));
        let input = User {
            login: "octocat".to_string(),
            name: "The Octocat".to_string(),
        };
        let req = client.new_request(HttpMethod::Post, "users", Some(&input)).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["login"], "octocat");
    }

    #[test]
    fn input_is_encoded_as_xml() {
        let mut client = Client::new("https://api.example.com/", Refused).unwrap();
        client.set_header("Content-Type", "application/xml; charset=utf-8").unwrap();
        let input = User {
            login: "octocat".to_string(),
            name: "Mona".to_string(),
        };
        let req = client.new_request(HttpMethod::Put, "users/1", Some(&input)).unwrap();
        assert_eq!(
            String::from_utf8(req.body).unwrap(),
            "<User><login>octocat</login><name>Mona</name></User>"
        );
    }

    #[test]
    fn input_without_headers_has_no_encoder() {
        let client = Client::new("https://api.example.com/", Refused).unwrap();
        let err = client
            .new_request(HttpMethod::Post, "users", Some(&User::default()))
            .unwrap_err();
        assert!(matches!(err, Error::NoEncoderAvailable));
    }

    #[test]
    fn unknown_content_type_is_unresolved() {
        let mut client = Client::new("https://api.example.com/", Refused).unwrap();
        client.set_header("Content-Type", "text/plain").unwrap();
        let err = client
            .new_request(HttpMethod::Post, "users", Some(&User::default()))
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedFormat(_)));
    }

    #[test]
    fn headers_are_copied_into_request() {
        let mut client = json_client(Canned::new(200, None, ""));
        client.append_header("X-Trace", "a").unwrap();
        client.append_header("x-trace", "b").unwrap();
        let req = client.new_request::<()>(HttpMethod::Get, "users", None).unwrap();

        client.set_header("Accept", "application/xml").unwrap();
        client.set_header("X-Late", "1").unwrap();

        assert_eq!(req.headers.get(ACCEPT).unwrap(), "application/json");
        assert!(req.headers.get("x-late").is_none());
        assert_eq!(req.headers.get_all("X-TRACE").iter().count(), 2);
    }

    #[test]
    fn invalid_header_is_rejected() {
        let mut client = Client::new("https://api.example.com/", Refused).unwrap();
        let err = client.set_header("bad header", "v").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn basic_auth_sets_authorization() {
        let mut client = Client::new("https://api.example.com/", Refused).unwrap();
        client.set_basic_auth("user", "pass").unwrap();
        assert_eq!(client.headers().get(AUTHORIZATION).unwrap(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn get_decodes_json_body() {
        let client = json_client(Canned::new(
            200,
            Some("application/json"),
            r#"{"login":"octocat","name":"The Octocat"}"#,
        ));
        let mut user = User::default();
        let res = client.get("users/octocat", &mut user).unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.request.url.as_str(), "https://api.example.com/v1/users/octocat");
        assert_eq!(user.login, "octocat");
        assert_eq!(user.name, "The Octocat");
    }

    #[test]
    fn not_found_is_http_error() {
        let client = json_client(Canned::new(
            404,
            Some("application/json"),
            r#"{"message":"Not Found"}"#,
        ));
        let mut user = User::default();
        let err = client.get("users/ghost", &mut user).unwrap_err();

        assert_eq!(err.to_string(), "GET https://api.example.com/v1/users/ghost: 404");
        assert_eq!(user, User::default());
        let Error::Http(http_err) = &err else {
            panic!("expected HTTP error, got {err:?}");
        };
        assert_eq!(http_err.status(), 404);
        assert_eq!(http_err.body, br#"{"message":"Not Found"}"#);
        assert_eq!(err.response().unwrap().headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn not_modified_and_zero_are_not_errors() {
        for status in [0, 204, 304] {
            let client = json_client(Canned::new(status, None, ""));
            let res = client.get("users", ()).unwrap();
            assert_eq!(res.status, status);
        }
    }

    #[test]
    fn no_content_leaves_output_untouched() {
        for status in [204, 304] {
            let client = json_client(Canned::new(status, Some("application/json"), ""));
            let mut user = User {
                login: "kept".to_string(),
                name: String::new(),
            };
            client.get("users/kept", &mut user).unwrap();
            assert_eq!(user.login, "kept");
        }
    }

    #[test]
    fn redirect_status_is_error() {
        let client = json_client(Canned::new(302, None, ""));
        let err = client.get("users", ()).unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[test]
    fn absent_output_skips_decoding() {
        let client = Client::new("https://api.example.com/", Canned::new(200, None, "not json")).unwrap();
        client.get("users", ()).unwrap();
        client.get("users", None::<&mut User>).unwrap();
    }

    #[test]
    fn raw_output_copies_bytes() {
        let client = json_client(Canned::new(200, Some("application/json"), "{not json"));
        let mut sink = Vec::new();
        client.get("users", Raw(&mut sink)).unwrap();
        assert_eq!(sink, b"{not json");
    }

    #[test]
    fn undecodable_body_is_decoding_error() {
        let client = json_client(Canned::new(200, Some("application/json"), "{not json"));
        let mut user = User::default();
        let err = client.get("users/1", &mut user).unwrap_err();
        assert!(matches!(err, Error::Decoding(_)));
    }

    #[test]
    fn response_content_type_is_last_resort() {
        let client = Client::new(
            "https://api.example.com/",
            Canned::new(200, Some("application/xml"), "<User><login>a</login><name>b</name></User>"),
        )
        .unwrap();
        let mut user = User::default();
        client.get("users/a", &mut user).unwrap();
        assert_eq!(user.login, "a");
    }

    #[test]
    fn output_without_any_media_type_has_no_decoder() {
        let client = Client::new("https://api.example.com/", Canned::new(200, None, "{}")).unwrap();
        let mut user = User::default();
        let err = client.get("users/a", &mut user).unwrap_err();
        assert!(matches!(err, Error::NoDecoderAvailable));
    }

    struct Fixed<'r> {
        reader: &'r mut dyn Read,
    }

    impl Decoder for Fixed<'_> {
        fn deserializer(&mut self) -> Box<dyn erased_serde::Deserializer<'static> + '_> {
            let mut drained = Vec::new();
            let _ = self.reader.read_to_end(&mut drained);
            Box::new(<dyn erased_serde::Deserializer>::erase(
                serde_json::json!({"login": "override", "name": "fixed"}),
            ))
        }
    }

    fn fixed<'r>(reader: &'r mut dyn Read) -> Box<dyn Decoder + 'r> {
        Box::new(Fixed { reader })
    }

    #[test]
    fn decoder_override_ignores_media_types() {
        let mut client = Client::new(
            "https://api.example.com/",
            Canned::new(200, Some("this is not a media type"), "whatever"),
        )
        .unwrap();
        client.set_header("Accept", "text/plain").unwrap();
        client.set_decoder_override(fixed);

        let mut user = User::default();
        client.get("users/a", &mut user).unwrap();
        assert_eq!(user.login, "override");
    }

    struct Failing;

    impl Encoder for Failing {
        fn encode(&mut self, _: &dyn erased_serde::Serialize) -> std::result::Result<(), CodecError> {
            Err("cannot encode".into())
        }
    }

    fn failing<'w>(_: &'w mut dyn Write) -> Box<dyn Encoder + 'w> {
        Box::new(Failing)
    }

    #[test]
    fn encoder_override_errors_surface_as_encoding() {
        let mut client = Client::new("https://api.example.com/", Refused).unwrap();
        client.set_encoder_override(failing);
        let err = client
            .new_request(HttpMethod::Post, "users", Some(&User::default()))
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));

        client.clear_overrides();
        let err = client
            .new_request(HttpMethod::Post, "users", Some(&User::default()))
            .unwrap_err();
        assert!(matches!(err, Error::NoEncoderAvailable));
    }

    #[test]
    fn owned_registry_is_used() {
        let mut registry = CodecRegistry::new();
        registry.register_decoder("json", fixed);
        let client = json_client(Canned::new(200, Some("application/json"), "{}")).with_registry(registry);

        let mut user = User::default();
        client.get("users/a", &mut user).unwrap();
        assert_eq!(user.name, "fixed");

        // the owned registry has no xml codec
        let mut client = client;
        client.set_header("Content-Type", "application/xml").unwrap();
        let err = client
            .new_request(HttpMethod::Post, "users", Some(&User::default()))
            .unwrap_err();
        assert!(matches!(err, Error::NoEncoderAvailable), "{err:?}");
    }

    #[test]
    fn known_format_missing_from_registry_has_no_decoder() {
        let mut registry = CodecRegistry::new();
        registry.register_encoder("json", crate::codec::json_encoder);
        let client = Client::new(
            "https://api.example.com/",
            Canned::new(200, Some("application/xml"), "<User/>"),
        )
        .unwrap()
        .with_registry(registry);

        let mut user = User::default();
        let err = client.get("users/a", &mut user).unwrap_err();
        assert!(matches!(err, Error::NoDecoderAvailable), "{err:?}");

        // a media type no known format matches stays unresolved
        let mut client = client;
        client.set_header("Accept", "text/plain").unwrap();
        let err = client.get("users/a", &mut user).unwrap_err();
        assert!(matches!(err, Error::UnresolvedFormat(_)), "{err:?}");
    }

    #[test]
    fn content_type_parameters_keep_their_commas() {
        let mut client = Client::new("https://api.example.com/", Refused).unwrap();
        client
            .set_header("Content-Type", r#"application/json; profile="a,b""#)
            .unwrap();
        let req = client
            .new_request(HttpMethod::Post, "users", Some(&User::default()))
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["login"], "");
    }

    #[test]
    fn accept_uses_first_media_range() {
        let mut client = Client::new(
            "https://api.example.com/",
            Canned::new(200, None, "<User><login>a</login><name>b</name></User>"),
        )
        .unwrap();
        client
            .set_header("Accept", "application/xml, application/json;q=0.5")
            .unwrap();
        let mut user = User::default();
        client.get("users/a", &mut user).unwrap();
        assert_eq!(user.name, "b");
    }

    /// Body reader that records when it is dropped.
    struct Tracked {
        inner: std::io::Cursor<&'static [u8]>,
        dropped: Arc<AtomicBool>,
    }

    impl Read for Tracked {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    struct Tracking {
        status: u16,
        body: &'static str,
        dropped: Arc<AtomicBool>,
    }

    impl Transport for Tracking {
        fn execute(&self, _: &HttpRequest) -> std::result::Result<TransportResponse, crate::http::TransportError> {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(TransportResponse {
                status: self.status,
                headers,
                body: Box::new(Tracked {
                    inner: std::io::Cursor::new(self.body.as_bytes()),
                    dropped: Arc::clone(&self.dropped),
                }),
            })
        }
    }

    #[test]
    fn body_is_released_on_every_outcome() {
        let cases = [
            (200, "{not json", "decoding"),
            (500, r#"{"message":"boom"}"#, "http"),
            (200, r#"{"login":"a","name":"b"}"#, "ok"),
        ];
        for (status, body, outcome) in cases {
            let dropped = Arc::new(AtomicBool::new(false));
            let client = json_client(Tracking {
                status,
                body,
                dropped: Arc::clone(&dropped),
            });

            let mut user = User::default();
            let result = client.get("users/a", &mut user);
            match outcome {
                "decoding" => assert!(matches!(result, Err(Error::Decoding(_))), "{result:?}"),
                "http" => assert!(matches!(result, Err(Error::Http(_))), "{result:?}"),
                _ => assert!(result.is_ok(), "{result:?}"),
            }
            assert!(dropped.load(Ordering::SeqCst), "{outcome}: body still held");
        }
    }

    /// Answers with a server error whose body never ends.
    struct Endless;

    impl Transport for Endless {
        fn execute(&self, _: &HttpRequest) -> std::result::Result<TransportResponse, crate::http::TransportError> {
            Ok(TransportResponse {
                status: 500,
                headers: HeaderMap::new(),
                body: Box::new(std::io::repeat(b'x')),
            })
        }
    }

    #[test]
    fn error_body_is_capped() {
        let client = json_client(Endless);
        let err = client.get("users", ()).unwrap_err();
        let Error::Http(http_err) = err else {
            panic!("expected HTTP error");
        };
        assert_eq!(http_err.body.len() as u64, MAX_ERROR_BODY);
        assert!(http_err.body.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn transport_errors_pass_through() {
        let client = Client::new("https://api.example.com/", Refused).unwrap();
        let err = client.get("users", ()).unwrap_err();
        let Error::Transport(source) = err else {
            panic!("expected transport error");
        };
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn verbs_send_their_method_and_body() {
        let transport = Canned::new(201, None, "");
        let seen = Arc::clone(&transport.seen);
        let client = json_client(transport);
        let input = User {
            login: "new".to_string(),
            name: "New".to_string(),
        };

        client.post("users", Some(&input), ()).unwrap();
        client.put("users/new", Some(&input), ()).unwrap();
        client.delete::<(), _>("users/new", None, ()).unwrap();

        let seen = seen.lock().unwrap();
        let methods: Vec<_> = seen.iter().map(|r| r.method).collect();
        assert_eq!(methods, [HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete]);
        assert!(!seen[0].body.is_empty());
        assert!(seen[2].body.is_empty());
    }
}
