//! Error types for requests and transports.

use smol_str::SmolStr;
use thiserror::Error;

use crate::{CacheKey, TransportResponse};

/// Failure surfaced by the HTTP transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The request never produced a response (connection, DNS, TLS, body read).
    #[error("network error: {0}")]
    Network(String),
    /// A response arrived with a status other than 200.
    #[error("request failed with status {}", .0.status)]
    Status(TransportResponse),
}

impl TransportError {
    /// The response attached to this failure, if the server answered.
    pub fn response(&self) -> Option<&TransportResponse> {
        match self {
            TransportError::Network(_) => None,
            TransportError::Status(response) => Some(response),
        }
    }

    /// HTTP status of the attached response.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|response| response.status)
    }
}

/// Outcome of a failed request.
///
/// The type is `Clone` because one failure is fanned out to every caller
/// waiting on the same cache key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// The transport failed. After retries are exhausted the last transport
    /// failure is reported as is.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The request was deliberately aborted and must not be retried.
    #[error("request {key} cancelled: {reason}")]
    Cancelled {
        /// Key of the cancelled request.
        key: CacheKey,
        /// Why it was cancelled.
        reason: SmolStr,
    },
    /// The response payload did not match the caller's expected type.
    #[error("failed to decode response data: {0}")]
    Decode(String),
    /// An interceptor refused the request or response.
    #[error("interceptor rejected the request: {0}")]
    Interceptor(String),
}

impl RequestError {
    /// Builds a cancellation error for `key`.
    pub fn cancelled(key: CacheKey, reason: impl Into<SmolStr>) -> Self {
        RequestError::Cancelled {
            key,
            reason: reason.into(),
        }
    }

    /// Returns `true` for deliberate cancellations.
    pub fn is_cancel(&self) -> bool {
        matches!(self, RequestError::Cancelled { .. })
    }

    /// The transport response attached to this failure, if any.
    pub fn response(&self) -> Option<&TransportResponse> {
        match self {
            RequestError::Transport(err) => err.response(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cancel_predicate() {
        let err = RequestError::cancelled(CacheKey::new("/users"), "duplicate");
        assert!(err.is_cancel());
        assert_eq!(err.to_string(), "request /users cancelled: duplicate");

        let err = RequestError::from(TransportError::Network("refused".into()));
        assert!(!err.is_cancel());
    }

    #[test]
    fn test_status_error_carries_response() {
        let response = TransportResponse::new(503, json!({"msg": "down"}));
        let err = RequestError::from(TransportError::Status(response.clone()));
        assert_eq!(err.response(), Some(&response));
        assert_eq!(err.to_string(), "request failed with status 503");
    }
}
