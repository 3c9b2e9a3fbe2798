//! Object store occupancy metrics.
//!
//! - `fetchbox_object_store_entries` - records currently held (gauge), labelled
//!   with the database name.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for the record count gauge.
    pub static ref OBJECT_STORE_ENTRIES: &'static str = {
        metrics::describe_gauge!(
            "fetchbox_object_store_entries",
            "Current number of records in the object store."
        );
        "fetchbox_object_store_entries"
    };
}

/// Records the current number of entries for `database`.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_entries(database: &str, entries: u64) {
    metrics::gauge!(*OBJECT_STORE_ENTRIES, "database" => database.to_string())
        .set(entries as f64);
}

/// Records the current number of entries (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_entries(_database: &str, _entries: u64) {}
