#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Response cache decisions and fan-out to coalesced callers.
pub mod cache;

/// The request client and its builder.
pub mod client;

/// Client configuration.
///
/// [`ClientConfig`] holds the base URL, default headers, bearer token, retry
/// delay, object store lifetime and executor concurrency. Every field has a
/// default and the whole struct can be loaded from YAML.
pub mod config;

/// Duplicate request cancellation.
pub mod dedup;

/// Bounded-parallelism task runner.
pub mod executor;

/// Built-in interceptors applied to every request.
pub mod interceptor;

/// Metrics collection.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Transport dispatches and their latency
/// - Cache hits and coalesced callers
/// - Retries and cancellations
/// - Storage write failures
pub mod metrics;

/// Per-client shared state.
pub mod registry;

/// Error reporting boundary.
pub mod report;

/// Retry with fixed backoff.
pub mod retry;

pub use cache::{CacheDecision, CacheService};
pub use client::{RequestClient, RequestClientBuilder};
pub use config::{ClientConfig, ConcurrencyLimit, ConfigError, DEFAULT_RETRY_DELAY};
pub use dedup::{DedupTicket, RequestDeduplicator};
pub use executor::{ConcurrentExecutor, ExecuteItem, ExecutorError, TaskFn};
pub use interceptor::GlobalInterceptors;
pub use registry::{EntryStatus, RequestRegistry, WaitReceiver};
pub use report::{ErrorReporter, LogoutReason, TracingReporter};
pub use retry::{RetryState, again_request};

pub use fetchbox_backend::{StorageError, StorageSet, StorageSetBuilder};
pub use fetchbox_core::{
    CacheKey, CodeStatus, Interceptors, Method, RequestDescriptor, RequestError,
    ResponseEnvelope, StorageTarget, Transport, TransportError, TransportRequest,
    TransportResponse, Value,
};
