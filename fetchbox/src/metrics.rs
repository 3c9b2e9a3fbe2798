//! Metrics declaration and recording helpers.

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Request metrics

    /// Track number of requests sent through the transport, retries included.
    pub static ref DISPATCH_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_dispatch_total",
            "Total number of transport dispatches."
        );
        "fetchbox_dispatch_total"
    };
    /// Histogram of transport call duration.
    pub static ref DISPATCH_DURATION: &'static str = {
        metrics::describe_histogram!(
            "fetchbox_dispatch_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of transport calls in seconds."
        );
        "fetchbox_dispatch_duration_seconds"
    };
    /// Track number of retries.
    pub static ref RETRY_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_retry_total",
            "Total number of retried requests."
        );
        "fetchbox_retry_total"
    };
    /// Track number of cancelled requests.
    pub static ref CANCEL_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_cancelled_total",
            "Total number of requests cancelled as duplicates or on demand."
        );
        "fetchbox_cancelled_total"
    };

    // Cache metrics

    /// Track number of responses served from storage.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_cache_hit_total",
            "Total number of responses served from storage."
        );
        "fetchbox_cache_hit_total"
    };
    /// Track number of callers that waited on an in-flight request.
    pub static ref CACHE_WAIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_cache_coalesced_total",
            "Total number of callers coalesced onto an in-flight request."
        );
        "fetchbox_cache_coalesced_total"
    };
    /// Track storage write errors per target.
    pub static ref STORAGE_WRITE_ERRORS: &'static str = {
        metrics::describe_counter!(
            "fetchbox_storage_write_errors_total",
            "Total number of failed storage writes per target."
        );
        "fetchbox_storage_write_errors_total"
    };
}

/// Records one transport call and how long it took.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_dispatch(transport: &str, duration: Duration) {
    metrics::counter!(*DISPATCH_COUNTER, "transport" => transport.to_string()).increment(1);
    metrics::histogram!(*DISPATCH_DURATION, "transport" => transport.to_string())
        .record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_dispatch(_transport: &str, _duration: Duration) {}

/// Records one retry.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_retry() {
    metrics::counter!(*RETRY_COUNTER).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_retry() {}

/// Records one cancellation.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_cancel() {
    metrics::counter!(*CANCEL_COUNTER).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_cancel() {}

/// Records one response served from `target`.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_cache_hit(target: &str) {
    metrics::counter!(*CACHE_HIT_COUNTER, "target" => target.to_string()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_cache_hit(_target: &str) {}

/// Records one caller coalesced onto an in-flight request.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_cache_wait() {
    metrics::counter!(*CACHE_WAIT_COUNTER).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_cache_wait() {}

/// Records one failed storage write.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_storage_write_error(target: &str) {
    metrics::counter!(*STORAGE_WRITE_ERRORS, "target" => target.to_string()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_storage_write_error(_target: &str) {}
