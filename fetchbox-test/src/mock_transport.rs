use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fetchbox_core::{Transport, TransportError, TransportRequest, TransportResponse};
use serde_json::{Value, json};
use tokio::time::Instant;

type Outcome = Result<TransportResponse, TransportError>;

#[derive(Debug, Default)]
pub struct TransportCounters {
    pub send_count: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl TransportCounters {
    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.send_count.store(0, Ordering::SeqCst);
        self.in_flight.store(0, Ordering::SeqCst);
        self.peak_in_flight.store(0, Ordering::SeqCst);
    }
}

/// Scripted transport.
///
/// Each send takes the next scripted outcome, or the fallback once the script
/// is used up, after waiting the configured delay.
#[derive(Clone, Debug)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    fallback: Arc<Outcome>,
    delay: Duration,
    requests: Arc<Mutex<Vec<(Instant, TransportRequest)>>>,
    pub counters: Arc<TransportCounters>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Answers every request with `{"code": 200, "data": null}`.
    pub fn new() -> Self {
        Self::with_fallback(Ok(TransportResponse::new(
            200,
            json!({"code": 200, "data": null}),
        )))
    }

    /// Answers every request with 200 and `body`.
    pub fn responding(body: Value) -> Self {
        Self::with_fallback(Ok(TransportResponse::new(200, body)))
    }

    /// Answers every request with `status` and `body`.
    pub fn responding_status(status: u16, body: Value) -> Self {
        Self::with_fallback(Ok(TransportResponse::new(status, body)))
    }

    /// Fails every request with `err`.
    pub fn failing(err: TransportError) -> Self {
        Self::with_fallback(Err(err))
    }

    fn with_fallback(fallback: Outcome) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(fallback),
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(TransportCounters::default()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues `outcome` ahead of the fallback.
    pub fn then(self, outcome: Outcome) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn send_count(&self) -> usize {
        self.counters.send_count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn last_request(&self) -> Option<TransportRequest> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, request)| request.clone())
    }

    /// When each request was received.
    pub fn sent_at(&self) -> Vec<Instant> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }
}

struct InFlight<'a>(&'a TransportCounters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a TransportCounters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.counters.send_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((Instant::now(), request));

        let _in_flight = InFlight::enter(&self.counters);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| (*self.fallback).clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
