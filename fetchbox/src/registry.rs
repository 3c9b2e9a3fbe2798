//! Shared request state for one client.
//!
//! A [`RequestRegistry`] holds everything that must be visible to every call
//! made through the same client: the storage targets, the per-key cache
//! status with its queue of waiting callers, and the handles of in-flight
//! requests that can be cancelled as duplicates. It is built once, wrapped in
//! an `Arc` and handed to the client. Two clients never share state unless
//! they are given the same registry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fetchbox_backend::StorageSet;
use fetchbox_core::{CacheKey, RequestError, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// One caller waiting for an in-flight request to settle.
pub(crate) type Waiter = oneshot::Sender<Result<Value, RequestError>>;

/// Receives the outcome of the in-flight request a caller was coalesced onto.
pub type WaitReceiver = oneshot::Receiver<Result<Value, RequestError>>;

/// Cache status of a key, including callers queued behind a pending request.
///
/// A key with no entry is absent: nothing is in flight and the stored value,
/// if any, is not trusted until it is fetched again.
pub(crate) enum EntryState {
    Pending(Vec<Waiter>),
    Complete,
}

/// Public view of [`EntryState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// A request for the key is in flight.
    Pending,
    /// The last request for the key succeeded and its body was stored.
    Complete,
}

/// In-flight request registered for duplicate cancellation.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) id: u64,
    pub(crate) token: CancellationToken,
}

/// State shared by every call made through one client.
pub struct RequestRegistry {
    storage: StorageSet,
    status: DashMap<CacheKey, EntryState>,
    pending_requests: DashMap<CacheKey, PendingRequest>,
    next_id: AtomicU64,
}

impl RequestRegistry {
    /// Creates an empty registry over `storage`.
    pub fn new(storage: StorageSet) -> Self {
        Self {
            storage,
            status: DashMap::new(),
            pending_requests: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates an empty registry, ready to be shared.
    pub fn shared(storage: StorageSet) -> Arc<Self> {
        Arc::new(Self::new(storage))
    }

    /// The storage targets cached bodies are written to.
    pub fn storage(&self) -> &StorageSet {
        &self.storage
    }

    /// Current cache status of `key`. `None` means absent.
    pub fn status(&self, key: &CacheKey) -> Option<EntryStatus> {
        self.status.get(key).map(|state| match state.value() {
            EntryState::Pending(_) => EntryStatus::Pending,
            EntryState::Complete => EntryStatus::Complete,
        })
    }

    /// Number of callers waiting on the pending request for `key`.
    pub fn waiting(&self, key: &CacheKey) -> usize {
        match self.status.get(key).as_deref() {
            Some(EntryState::Pending(waiters)) => waiters.len(),
            _ => 0,
        }
    }

    /// Number of in-flight requests registered for duplicate cancellation.
    pub fn pending_request_count(&self) -> usize {
        self.pending_requests.len()
    }

    /// Whether a request for `key` is registered for duplicate cancellation.
    pub fn has_pending_request(&self, key: &CacheKey) -> bool {
        self.pending_requests.contains_key(key)
    }

    pub(crate) fn status_entry(&self, key: CacheKey) -> Entry<'_, CacheKey, EntryState> {
        self.status.entry(key)
    }

    /// Marks `key` complete and takes its waiters in one step.
    pub(crate) fn complete(&self, key: &CacheKey) -> Vec<Waiter> {
        match self.status.insert(key.clone(), EntryState::Complete) {
            Some(EntryState::Pending(waiters)) => waiters,
            _ => Vec::new(),
        }
    }

    /// Reverts `key` to absent and takes its waiters in one step.
    pub(crate) fn release(&self, key: &CacheKey) -> Vec<Waiter> {
        match self.status.remove(key) {
            Some((_, EntryState::Pending(waiters))) => waiters,
            _ => Vec::new(),
        }
    }

    /// Reverts `key` to absent only if it is still pending.
    pub(crate) fn abandon(&self, key: &CacheKey) -> Vec<Waiter> {
        match self
            .status
            .remove_if(key, |_, state| matches!(state, EntryState::Pending(_)))
        {
            Some((_, EntryState::Pending(waiters))) => waiters,
            _ => Vec::new(),
        }
    }

    pub(crate) fn pending_requests(&self) -> &DashMap<CacheKey, PendingRequest> {
        &self.pending_requests
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new(StorageSet::default())
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("storage", &self.storage)
            .field("status", &self.status.len())
            .field("pending_requests", &self.pending_requests.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(registry: &RequestRegistry, key: &CacheKey) -> WaitReceiver {
        let (tx, rx) = oneshot::channel();
        match registry.status_entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                EntryState::Pending(waiters) => waiters.push(tx),
                EntryState::Complete => panic!("expected pending"),
            },
            Entry::Vacant(entry) => {
                entry.insert(EntryState::Pending(vec![tx]));
            }
        }
        rx
    }

    #[test]
    fn test_absent_by_default() {
        let registry = RequestRegistry::default();
        assert_eq!(registry.status(&CacheKey::new("/users")), None);
        assert_eq!(registry.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_complete_drains_waiters() {
        let registry = RequestRegistry::default();
        let key = CacheKey::new("/users");
        let rx = pending(&registry, &key);
        assert_eq!(registry.waiting(&key), 1);

        let waiters = registry.complete(&key);
        assert_eq!(waiters.len(), 1);
        assert_eq!(registry.status(&key), Some(EntryStatus::Complete));
        assert_eq!(registry.waiting(&key), 0);

        for waiter in waiters {
            let _ = waiter.send(Ok(json!(1)));
        }
        assert_eq!(rx.await.unwrap(), Ok(json!(1)));
    }

    #[test]
    fn test_release_reverts_to_absent() {
        let registry = RequestRegistry::default();
        let key = CacheKey::new("/users");
        let _rx = pending(&registry, &key);

        assert_eq!(registry.release(&key).len(), 1);
        assert_eq!(registry.status(&key), None);
        assert!(registry.release(&key).is_empty());
    }

    #[test]
    fn test_abandon_keeps_complete_entries() {
        let registry = RequestRegistry::default();
        let key = CacheKey::new("/users");
        registry.complete(&key);

        assert!(registry.abandon(&key).is_empty());
        assert_eq!(registry.status(&key), Some(EntryStatus::Complete));
    }
}
