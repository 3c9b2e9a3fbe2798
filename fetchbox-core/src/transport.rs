//! The boundary between fetchbox and the HTTP client that sends requests.
//!
//! A [`Transport`] knows nothing about caching, deduplication or retries. It
//! takes a fully prepared [`TransportRequest`], sends it once and reports what
//! came back. Cancellation is handled by the caller dropping the returned
//! future, so any transport whose send future is cancel-safe on drop (as
//! `reqwest`'s is) supports cancellation without extra work.

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, Method};
use serde_json::Value;

use crate::{RequestDescriptor, TransportError};

/// A request ready to go over the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path or absolute URL. Transports resolve relative paths
    /// against their base URL.
    pub url: String,
    /// Request headers after interceptors ran.
    pub headers: HeaderMap,
    /// Query string parameters (GET requests).
    pub query: Option<Value>,
    /// JSON body (every other method).
    pub body: Option<Value>,
}

impl TransportRequest {
    /// Lowers a descriptor into a wire request.
    ///
    /// For GET the params become the query string, otherwise they are the
    /// JSON body.
    pub fn from_descriptor(descriptor: &RequestDescriptor) -> Self {
        let (query, body) = if descriptor.method == Method::GET {
            (descriptor.params.clone(), None)
        } else {
            (None, descriptor.params.clone())
        };
        Self {
            method: descriptor.method.clone(),
            url: descriptor.url.clone(),
            headers: descriptor.headers.clone(),
            query,
            body,
        }
    }
}

/// What the server answered.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, `null` when the body was empty.
    pub body: Value,
    /// Whether the transport followed a redirect to produce this response.
    pub redirected: bool,
}

impl TransportResponse {
    /// A response that was not redirected.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            redirected: false,
        }
    }
}

/// Sends prepared requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` once.
    ///
    /// Any HTTP response, whatever its status, is `Ok`; status policy belongs
    /// to the client. `Err` means no response was obtained.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "transport"
    }
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_params_become_query() {
        let descriptor = RequestDescriptor::get("/users").params(json!({"id": 1}));
        let request = TransportRequest::from_descriptor(&descriptor);
        assert_eq!(request.query, Some(json!({"id": 1})));
        assert_eq!(request.body, None);
    }

    #[test]
    fn test_post_params_become_body() {
        let descriptor = RequestDescriptor::post("/users").params(json!({"name": "a"}));
        let request = TransportRequest::from_descriptor(&descriptor);
        assert_eq!(request.query, None);
        assert_eq!(request.body, Some(json!({"name": "a"})));
    }
}
