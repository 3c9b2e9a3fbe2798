//! Span capture for asserting on `fetchbox.*` spans in tests.
//!
//! ```ignore
//! let collector = create_span_collector();
//! client
//!     .request_value(descriptor)
//!     .with_subscriber(collector.dispatch().clone())
//!     .await;
//! let request = &collector.spans_named("fetchbox.request")[0];
//! assert_eq!(collector.children_of(request).len(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Dispatch, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

const PREFIX: &str = "fetchbox.";

/// One recorded span.
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: &'static str,
    pub fields: BTreeMap<&'static str, String>,
    /// Set once every handle to the span has been dropped.
    pub closed: bool,
}

impl CapturedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Spans in creation order. The registry reuses the id of a closed span, so
/// lookups by id only consider spans that are still open.
type Spans = Arc<Mutex<Vec<CapturedSpan>>>;

struct Fields<'a>(&'a mut BTreeMap<&'static str, String>);

impl Visit for Fields<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name(), format!("{value:?}"));
    }
}

/// Layer recording every span whose name starts with `fetchbox.`.
pub struct SpanCaptureLayer {
    spans: Spans,
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let name = attrs.metadata().name();
        if !name.starts_with(PREFIX) {
            return;
        }

        let mut fields = BTreeMap::new();
        attrs.record(&mut Fields(&mut fields));
        // The registry has already resolved explicit and contextual parents.
        let parent_id = ctx
            .span(id)
            .and_then(|span| span.parent())
            .map(|parent| parent.id().into_u64());

        lock(&self.spans).push(CapturedSpan {
            id: id.into_u64(),
            parent_id,
            name,
            fields,
            closed: false,
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        if let Some(span) = open_span(&mut lock(&self.spans), id) {
            values.record(&mut Fields(&mut span.fields));
        }
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        if let Some(span) = open_span(&mut lock(&self.spans), &id) {
            span.closed = true;
        }
    }
}

fn open_span<'a>(spans: &'a mut [CapturedSpan], id: &Id) -> Option<&'a mut CapturedSpan> {
    let id = id.into_u64();
    spans
        .iter_mut()
        .rev()
        .find(|span| span.id == id && !span.closed)
}

fn lock(spans: &Spans) -> MutexGuard<'_, Vec<CapturedSpan>> {
    spans.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to the spans captured by one dispatch.
#[derive(Clone)]
pub struct SpanCollector {
    spans: Spans,
    dispatch: Dispatch,
}

/// Creates a collector with its own dispatch, independent of any global
/// subscriber.
pub fn create_span_collector() -> SpanCollector {
    let spans = Spans::default();
    let layer = SpanCaptureLayer {
        spans: spans.clone(),
    };
    SpanCollector {
        spans,
        dispatch: Dispatch::new(Registry::default().with(layer)),
    }
}

impl SpanCollector {
    /// Dispatch to run the code under test with.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.filtered(|_| true)
    }

    pub fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.filtered(|span| span.name == name)
    }

    pub fn children_of(&self, parent: &CapturedSpan) -> Vec<CapturedSpan> {
        self.filtered(|span| span.parent_id == Some(parent.id))
    }

    pub fn has_span(&self, name: &str) -> bool {
        lock(&self.spans).iter().any(|span| span.name == name)
    }

    pub fn clear(&self) {
        lock(&self.spans).clear();
    }

    fn filtered(&self, keep: impl Fn(&CapturedSpan) -> bool) -> Vec<CapturedSpan> {
        lock(&self.spans)
            .iter()
            .filter(|span| keep(span))
            .cloned()
            .collect()
    }
}
