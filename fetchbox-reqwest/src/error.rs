use thiserror::Error;

/// Errors raised while building a [`ReqwestTransport`](crate::ReqwestTransport).
#[derive(Debug, Error)]
pub enum TransportBuildError {
    /// The configured base URL is not an absolute URL.
    #[error("invalid base url `{url}`: {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The reqwest client could not be built.
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}
