//! [`Transport`] over a `reqwest` client.

use async_trait::async_trait;
use fetchbox::ClientConfig;
use fetchbox_core::{Transport, TransportError, TransportRequest, TransportResponse, query_string};
use http::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, trace};

use crate::TransportBuildError;

/// Sends fetchbox requests with `reqwest`.
///
/// Redirects are followed by the client; a response reached through one is
/// marked `redirected` so the request client can end the session.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Option<Url>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl ReqwestTransport {
    /// Wraps an existing client. Request URLs must then be absolute.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Resolves relative request paths against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, TransportBuildError> {
        let invalid = |reason: String| TransportBuildError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason,
        };
        let url = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("cannot be used as a base".to_owned()));
        }
        self.base_url = Some(url);
        Ok(self)
    }

    /// Builds a transport with a fresh client and the configured base URL.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportBuildError> {
        let transport = Self::new(Client::builder().build()?);
        match &config.base_url {
            Some(base_url) => transport.with_base_url(base_url),
            None => Ok(transport),
        }
    }

    /// The base URL relative paths are resolved against.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Full URL for `request`, query string included.
    pub fn resolve(&self, request: &TransportRequest) -> Result<Url, TransportError> {
        let joined = match &self.base_url {
            Some(base) if !is_absolute(&request.url) => format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                request.url.trim_start_matches('/')
            ),
            _ => request.url.clone(),
        };
        let mut url = Url::parse(&joined)
            .map_err(|err| TransportError::Network(format!("invalid url `{joined}`: {err}")))?;

        if let Some(query) = request.query.as_ref().and_then(query_string) {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                _ => query,
            };
            url.set_query(Some(&merged));
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = self.resolve(&request)?;
        let has_content_type = request.headers.contains_key(CONTENT_TYPE);

        let mut builder = self
            .client
            .request(request.method, url.clone())
            .headers(request.headers);
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|err| TransportError::Network(format!("failed to encode body: {err}")))?;
            if !has_content_type {
                builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            builder = builder.body(bytes);
        }

        trace!(%url, "Sending request");
        let response = builder.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let redirected = response.url() != &url;
        let bytes = response.bytes().await.map_err(network)?;
        debug!(%url, status, redirected, "Received response");

        Ok(TransportResponse {
            status,
            body: parse_body(&bytes),
            redirected,
        })
    }

    fn name(&self) -> &str {
        "reqwest"
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn network(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

/// Empty bodies are `null`; anything that is not JSON is kept as text.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
