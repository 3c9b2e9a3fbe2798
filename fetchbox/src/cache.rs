//! Response cache decisions and fan-out to coalesced callers.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use fetchbox_backend::{Storage, StorageResult};
use fetchbox_core::{CacheKey, RequestError, StorageTarget, Value, is_empty_value};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::registry::{EntryState, RequestRegistry, WaitReceiver};

/// What a caller should do about a request, given the cache state of its key.
#[derive(Debug)]
pub enum CacheDecision {
    /// Caching is disabled for this request. Dispatch without bookkeeping.
    Bypass,
    /// The key is complete and its stored value is usable.
    Hit(Value),
    /// A request for the key is in flight. The receiver yields its outcome.
    Wait(WaitReceiver),
    /// The caller now owns the pending status of the key and must dispatch.
    Dispatch,
}

/// Cache operations for one request, bound to its storage target.
#[derive(Debug, Clone)]
pub struct CacheService {
    registry: Arc<RequestRegistry>,
    target: StorageTarget,
}

impl CacheService {
    /// Binds the registry to `target`.
    pub fn new(registry: Arc<RequestRegistry>, target: StorageTarget) -> Self {
        Self { registry, target }
    }

    /// Storage target this service reads and writes.
    pub fn target(&self) -> StorageTarget {
        self.target
    }

    /// Decides whether `key` is served from storage, coalesced onto an
    /// in-flight request, or dispatched.
    ///
    /// A caller that finds the key pending always waits, so concurrent
    /// identical requests share one dispatch even before anything was stored.
    /// A complete key whose stored value is missing or empty is claimed
    /// again and dispatched.
    pub async fn determine_cache(&self, enabled: bool, key: &CacheKey) -> CacheDecision {
        if !enabled {
            return CacheDecision::Bypass;
        }

        match self.registry.status_entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                EntryState::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    trace!(%key, waiting = waiters.len(), "Waiting on in-flight request");
                    crate::metrics::record_cache_wait();
                    return CacheDecision::Wait(rx);
                }
                // Read storage outside the map lock.
                EntryState::Complete => {}
            },
            Entry::Vacant(entry) => {
                entry.insert(EntryState::Pending(Vec::new()));
                debug!(%key, "Cache miss, dispatching");
                return CacheDecision::Dispatch;
            }
        }

        match self.get_storage(key).await {
            Ok(Some(value)) if !is_empty_value(&value) => {
                debug!(%key, target = %self.target, "Cache hit");
                crate::metrics::record_cache_hit(self.target.as_str());
                return CacheDecision::Hit(value);
            }
            Ok(_) => {}
            Err(err) => warn!(%key, target = %self.target, error = %err, "Failed to read cached value"),
        }

        // The status may have changed while storage was read.
        match self.registry.status_entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                EntryState::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    crate::metrics::record_cache_wait();
                    CacheDecision::Wait(rx)
                }
                EntryState::Complete => {
                    entry.insert(EntryState::Pending(Vec::new()));
                    debug!(%key, "Stored value unusable, dispatching");
                    CacheDecision::Dispatch
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(EntryState::Pending(Vec::new()));
                debug!(%key, "Cache miss, dispatching");
                CacheDecision::Dispatch
            }
        }
    }

    /// Writes `value` to the storage target. Empty values are not stored.
    pub async fn set_storage(&self, key: &CacheKey, value: &Value) -> StorageResult<()> {
        if is_empty_value(value) {
            trace!(%key, "Skipping storage of empty value");
            return Ok(());
        }
        self.storage()?.set(key.as_str(), value).await
    }

    /// Reads the value stored under `key` in the storage target.
    pub async fn get_storage(&self, key: &CacheKey) -> StorageResult<Option<Value>> {
        self.storage()?.get(key.as_str()).await
    }

    /// Settles the pending status of `key` and delivers `outcome` to every
    /// queued caller, returning how many were notified.
    ///
    /// Success marks the key complete; failure reverts it to absent. The
    /// queue is taken and the status changed in a single step, so a second
    /// call for the same settle finds no one to notify.
    pub fn trigger_callback(&self, key: &CacheKey, outcome: &Result<Value, RequestError>) -> usize {
        let waiters = match outcome {
            Ok(_) => self.registry.complete(key),
            Err(_) => self.registry.release(key),
        };
        let notified = waiters.len();
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }
        if notified > 0 {
            debug!(%key, notified, success = outcome.is_ok(), "Notified waiting callers");
        }
        notified
    }

    /// Stores a successful body, then marks the key complete and notifies
    /// waiters. Storage failures are logged and the body is simply not cached.
    pub async fn complete(&self, key: &CacheKey, value: &Value) -> usize {
        if let Err(err) = self.set_storage(key, value).await {
            warn!(%key, target = %self.target, error = %err, "Failed to store response, caching disabled for it");
            crate::metrics::record_storage_write_error(self.target.as_str());
        }
        self.trigger_callback(key, &Ok(value.clone()))
    }

    /// Reverts the key to absent and delivers `err` to waiters.
    pub fn fail(&self, key: &CacheKey, err: &RequestError) -> usize {
        self.trigger_callback(key, &Err(err.clone()))
    }

    /// Deletes expired records from every storage target that expires them.
    pub async fn clear_expired(&self) -> StorageResult<usize> {
        let mut removed = 0;
        for (target, storage) in self.registry.storage().iter() {
            let count = storage.clear_expired().await?;
            trace!(%target, count, "Cleared expired records");
            removed += count;
        }
        Ok(removed)
    }

    fn storage(&self) -> StorageResult<&Arc<dyn Storage>> {
        self.registry.storage().resolve(self.target)
    }
}
