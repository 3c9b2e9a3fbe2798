//! Duplicate request cancellation.
//!
//! A request that opts in with `cancel_on_duplicate` registers a
//! cancellation handle under its key for as long as it is in flight. An
//! identical request issued meanwhile is cancelled before it is sent: the
//! request already in flight wins.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use fetchbox_core::{CacheKey, RequestDescriptor, RequestError, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::{PendingRequest, RequestRegistry};

/// Reason carried by a request cancelled because an identical one was in flight.
pub const DUPLICATE_REASON: &str = "duplicate request in flight";

/// Reason carried by a request cancelled through [`RequestDeduplicator::cancel_pending`]
/// or [`RequestDeduplicator::clear_all_pending`].
pub const CANCELLED_REASON: &str = "request cancelled";

/// Registers and cancels in-flight requests by key.
#[derive(Debug, Clone)]
pub struct RequestDeduplicator {
    registry: Arc<RequestRegistry>,
}

/// Cancellation handle of one logical request.
///
/// Dropping a tracked ticket removes its registration, but only if the
/// registration is still its own.
#[derive(Debug)]
pub struct DedupTicket {
    key: CacheKey,
    token: CancellationToken,
    registration: Option<(u64, Arc<RequestRegistry>)>,
}

impl DedupTicket {
    /// The token observed by the in-flight transport call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether this ticket holds a registration in the registry.
    pub fn is_tracked(&self) -> bool {
        self.registration.is_some()
    }

    /// Key the ticket is registered under.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for DedupTicket {
    fn drop(&mut self) {
        if let Some((id, registry)) = self.registration.take() {
            let removed = registry
                .pending_requests()
                .remove_if(&self.key, |_, pending| pending.id == id);
            if let Some((_, pending)) = removed {
                // The request has settled, so this only marks the token done.
                pending.token.cancel();
            }
        }
    }
}

impl RequestDeduplicator {
    /// Creates a deduplicator over `registry`.
    pub fn new(registry: Arc<RequestRegistry>) -> Self {
        Self { registry }
    }

    /// Registers `descriptor` under `key` if it opts into duplicate cancellation.
    ///
    /// Returns [`RequestError::Cancelled`] when an identical request is
    /// already registered. Requests that do not opt in get an untracked
    /// ticket that is never cancelled by other requests.
    pub fn add_pending_request(
        &self,
        descriptor: &RequestDescriptor,
        key: &CacheKey,
    ) -> Result<DedupTicket, RequestError> {
        let token = CancellationToken::new();
        if !descriptor.cancel_on_duplicate {
            return Ok(DedupTicket {
                key: key.clone(),
                token,
                registration: None,
            });
        }

        match self.registry.pending_requests().entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!(%key, "Cancelling duplicate request");
                crate::metrics::record_cancel();
                Err(RequestError::cancelled(key.clone(), DUPLICATE_REASON))
            }
            Entry::Vacant(entry) => {
                let id = self.registry.next_request_id();
                entry.insert(PendingRequest {
                    id,
                    token: token.clone(),
                });
                Ok(DedupTicket {
                    key: key.clone(),
                    token,
                    registration: Some((id, self.registry.clone())),
                })
            }
        }
    }

    /// Releases the registration held by `ticket` once its request settles.
    pub fn remove_pending_request(&self, ticket: DedupTicket) {
        drop(ticket);
    }

    /// Cancels the in-flight request for `url` and `params`. Returns whether
    /// one was registered.
    pub fn cancel_pending(&self, url: &str, params: Option<&Value>) -> bool {
        let key = CacheKey::from_request(url, params);
        match self.registry.pending_requests().remove(&key) {
            Some((_, pending)) => {
                debug!(%key, "Cancelling pending request");
                crate::metrics::record_cancel();
                pending.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every registered in-flight request, returning how many there were.
    pub fn clear_all_pending(&self) -> usize {
        let keys = self
            .registry
            .pending_requests()
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        let mut cancelled = 0;
        for key in keys {
            if let Some((_, pending)) = self.registry.pending_requests().remove(&key) {
                pending.token.cancel();
                crate::metrics::record_cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "Cleared pending requests");
        }
        cancelled
    }
}
