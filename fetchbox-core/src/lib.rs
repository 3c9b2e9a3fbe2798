#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Caller-facing request description.
pub mod descriptor;
/// Response body envelope returned by the backend API.
pub mod envelope;
/// Error taxonomy for requests and transports.
pub mod error;
/// Per-call and per-instance interceptor hooks.
pub mod interceptor;
/// Cache and deduplication key derivation.
pub mod key;
/// Storage target selector.
pub mod target;
/// HTTP transport boundary.
pub mod transport;
/// Helpers for inspecting JSON values.
pub mod value;

pub use descriptor::RequestDescriptor;
pub use envelope::{CodeStatus, ResponseEnvelope};
pub use error::{RequestError, TransportError};
pub use interceptor::{ErrorInterceptor, Interceptors, RequestInterceptor, ResponseInterceptor};
pub use key::{CacheKey, query_string};
pub use target::StorageTarget;
pub use transport::{Transport, TransportRequest, TransportResponse};
pub use value::is_empty_value;

pub use http::Method;
pub use serde_json::Value;
