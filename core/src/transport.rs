//! Blocking transport backed by `ureq`.

use std::time::Duration;

use tracing::trace;

use crate::http::{HttpRequest, Transport, TransportError, TransportResponse};

/// Configuration for [`UreqTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for the whole round trip; `None` waits forever.
    pub timeout: Option<Duration>,

    /// Redirects followed before the 3xx response is returned as is.
    pub max_redirects: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            max_redirects: 10,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }
}

/// [`Transport`] that executes requests on a `ureq` agent.
///
/// Every status code comes back as a response; classifying it is left to
/// the client.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: TransportConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout)
            .max_redirects(config.max_redirects)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        trace!(method = %request.method, url = %request.url, bytes = request.body.len(), "sending request");
        let response = if request.body.is_empty() {
            self.agent.run(builder.body(())?)?
        } else {
            self.agent.run(builder.body(request.body.as_slice())?)?
        };

        let (parts, body) = response.into_parts();
        Ok(TransportResponse {
            status: parts.status.as_u16(),
            headers: parts.headers,
            body: Box::new(body.into_reader()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_redirects, 10);
    }

    #[test]
    fn builder_pattern() {
        let config = TransportConfig::new().no_timeout().max_redirects(0);
        assert!(config.timeout.is_none());
        assert_eq!(config.max_redirects, 0);

        let config = TransportConfig::new().timeout(Duration::from_millis(250));
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
    }
}
