//! The request client.
//!
//! [`RequestClient::request_value`] runs a descriptor through the per-call
//! request interceptor, consults the response cache, and only then
//! dispatches. A dispatch registers the request for duplicate cancellation,
//! applies the instance and global interceptors, sends it through the
//! transport and retries failures with a fixed delay. Whatever the outcome,
//! the caller that claimed the key settles its cache status and every
//! coalesced caller is told.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fetchbox_backend::{KeyValueStore, ObjectStore, StorageResult, StorageSet, StorageSetBuilder};
use fetchbox_core::{
    CacheKey, Interceptors, RequestDescriptor, RequestError, ResponseEnvelope, StorageTarget,
    Transport, Value, is_empty_value,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use crate::cache::{CacheDecision, CacheService};
use crate::dedup::{CANCELLED_REASON, RequestDeduplicator};
use crate::interceptor::GlobalInterceptors;
use crate::registry::RequestRegistry;
use crate::report::{ErrorReporter, TracingReporter, handle_network_error};
use crate::retry::{RetryState, again_request};
use crate::{ClientConfig, ConcurrencyLimit, ConcurrentExecutor, ConfigError};

/// HTTP client with response caching, coalescing, duplicate cancellation and
/// retries.
///
/// Clones share the transport and the registry, so caching and duplicate
/// detection work across every clone.
#[derive(Clone)]
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    registry: Arc<RequestRegistry>,
    deduplicator: RequestDeduplicator,
    global: GlobalInterceptors,
    interceptors: Interceptors,
    retry_delay: Duration,
    concurrency: ConcurrencyLimit,
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("transport", &self.transport.name())
            .field("registry", &self.registry)
            .field("interceptors", &self.interceptors)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl RequestClient {
    /// Starts a builder around `transport`.
    pub fn builder<T>(transport: T) -> RequestClientBuilder
    where
        T: Transport + 'static,
    {
        RequestClientBuilder::new(Arc::new(transport))
    }

    /// Sends `descriptor` and deserializes the response `data` into `T`.
    pub async fn request<T>(&self, descriptor: RequestDescriptor) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
    {
        let value = self.request_value(descriptor).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends `descriptor` and returns the response `data` as JSON.
    pub async fn request_value(&self, descriptor: RequestDescriptor) -> Result<Value, RequestError> {
        let interceptors = descriptor.interceptors.clone();
        let descriptor = interceptors.intercept_request(descriptor)?;
        let key = descriptor.cache_key();

        let span = info_span!(
            "fetchbox.request",
            method = %descriptor.method,
            key = %key,
            cache = descriptor.uses_cache(),
            storage = %descriptor.storage,
        );
        self.resolve(descriptor, key).instrument(span).await
    }

    /// Cancels the in-flight request for `url` and `params`, if one was sent
    /// with duplicate cancellation enabled.
    pub fn cancel_pending(&self, url: &str, params: Option<&Value>) -> bool {
        self.deduplicator.cancel_pending(url, params)
    }

    /// Cancels every in-flight request sent with duplicate cancellation
    /// enabled. Returns how many were cancelled.
    pub fn clear_all_pending(&self) -> usize {
        self.deduplicator.clear_all_pending()
    }

    /// Deletes expired records from every storage target.
    pub async fn clear_expired(&self) -> StorageResult<usize> {
        CacheService::new(self.registry.clone(), StorageTarget::default())
            .clear_expired()
            .await
    }

    /// The registry holding this client's cache and in-flight state.
    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    /// A new executor limited to the configured concurrency.
    pub fn executor<V, T, E>(&self) -> ConcurrentExecutor<V, T, E> {
        ConcurrentExecutor::new(self.concurrency)
    }

    async fn resolve(
        &self,
        descriptor: RequestDescriptor,
        key: CacheKey,
    ) -> Result<Value, RequestError> {
        let cache = CacheService::new(self.registry.clone(), descriptor.storage);
        let claimed = loop {
            match cache.determine_cache(descriptor.uses_cache(), &key).await {
                CacheDecision::Hit(value) => return Ok(value),
                CacheDecision::Wait(rx) => match rx.await {
                    Ok(Ok(value)) if !is_empty_value(&value) => return Ok(value),
                    Ok(Err(err)) => return Err(err),
                    Ok(Ok(_)) => {
                        debug!(%key, "Coalesced request yielded no value, dispatching");
                        break false;
                    }
                    // The claiming caller was dropped; the key is absent again.
                    Err(_) => {
                        debug!(%key, "Coalesced request was abandoned, looking up again");
                        continue;
                    }
                },
                CacheDecision::Dispatch => break true,
                CacheDecision::Bypass => break false,
            }
        };
        self.handle_request(&descriptor, &key, &cache, claimed).await
    }

    async fn handle_request(
        &self,
        descriptor: &RequestDescriptor,
        key: &CacheKey,
        cache: &CacheService,
        claimed: bool,
    ) -> Result<Value, RequestError> {
        let guard = PendingGuard::new(&self.registry, key, claimed);

        let result = self.dispatch(descriptor, key).await.and_then(|envelope| {
            descriptor
                .interceptors
                .intercept_response(envelope)
                .map(|envelope| envelope.data)
        });

        // Only the caller holding the pending entry may settle it. A fallthrough
        // dispatch would otherwise clobber an entry claimed by someone else.
        match &result {
            Ok(data) => {
                if claimed {
                    cache.complete(key, data).await;
                }
            }
            Err(err) => {
                if claimed {
                    cache.fail(key, err);
                }
                if matches!(err, RequestError::Transport(_)) {
                    handle_network_error(self.global.reporter().as_ref(), err.response());
                }
            }
        }
        guard.disarm();
        result
    }

    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        key: &CacheKey,
    ) -> Result<ResponseEnvelope, RequestError> {
        let ticket = self.deduplicator.add_pending_request(descriptor, key)?;
        let descriptor = self
            .interceptors
            .intercept_request(descriptor.clone())
            .map_err(|err| self.interceptors.catch_request(err))?;

        let result = match self.send_once(&descriptor, key, ticket.token()).await {
            Ok(envelope) => Ok(envelope),
            Err(err) => {
                let delay = descriptor.retry_delay.unwrap_or(self.retry_delay);
                let mut state = RetryState::new(descriptor.retry, delay);
                again_request(key, err, &mut state, ticket.token(), || {
                    self.send_once(&descriptor, key, ticket.token())
                })
                .await
            }
        };

        self.deduplicator.remove_pending_request(ticket);
        result
    }

    async fn send_once(
        &self,
        descriptor: &RequestDescriptor,
        key: &CacheKey,
        token: &CancellationToken,
    ) -> Result<ResponseEnvelope, RequestError> {
        let request = self.global.prepare(descriptor);
        let span = info_span!(
            "fetchbox.dispatch",
            transport = self.transport.name(),
            url = %request.url,
        );

        let started = Instant::now();
        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%key, "Request cancelled");
                return Err(RequestError::cancelled(key.clone(), CANCELLED_REASON));
            }
            sent = self.transport.send(request).instrument(span) => sent,
        };
        crate::metrics::record_dispatch(self.transport.name(), started.elapsed());

        sent.map_err(RequestError::from)
            .and_then(|response| self.global.handle_response(response))
            .and_then(|envelope| self.interceptors.intercept_response(envelope))
            .map_err(|err| self.interceptors.catch_response(err))
    }
}

/// Reverts a claimed cache key to absent if its request is dropped before it
/// settles. Waiters queued on it are released and look the key up again, so
/// one of them claims it and the rest keep waiting.
struct PendingGuard<'a> {
    registry: &'a RequestRegistry,
    key: &'a CacheKey,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(registry: &'a RequestRegistry, key: &'a CacheKey, armed: bool) -> Self {
        Self {
            registry,
            key,
            armed,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let released = self.registry.abandon(self.key).len();
        debug!(key = %self.key, released, "Request dropped before settling");
    }
}

/// Builder for [`RequestClient`].
pub struct RequestClientBuilder {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    storage: StorageSetBuilder,
    object_store: Option<Arc<dyn ObjectStore>>,
    registry: Option<Arc<RequestRegistry>>,
    reporter: Arc<dyn ErrorReporter>,
    interceptors: Interceptors,
}

impl RequestClientBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
            storage: StorageSet::builder(),
            object_store: None,
            registry: None,
            reporter: Arc::new(TracingReporter),
            interceptors: Interceptors::default(),
        }
    }

    /// Client-wide settings.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage targets for a registry built by this builder.
    pub fn storage(mut self, storage: StorageSetBuilder) -> Self {
        self.storage = storage;
        self
    }

    /// Persistent store for the local target.
    pub fn local<S>(mut self, store: S) -> Self
    where
        S: KeyValueStore + 'static,
    {
        self.storage = self.storage.local(store);
        self
    }

    /// Store for the session target.
    pub fn session<S>(mut self, store: S) -> Self
    where
        S: KeyValueStore + 'static,
    {
        self.storage = self.storage.session(store);
        self
    }

    /// Object store for the object store target. Records live for the
    /// configured `object_store_ttl`.
    pub fn object_store<O>(mut self, store: O) -> Self
    where
        O: ObjectStore + 'static,
    {
        self.object_store = Some(Arc::new(store));
        self
    }

    /// Uses an existing registry. Storage set on this builder is then ignored,
    /// and every client built over the same registry shares its cache.
    pub fn registry(mut self, registry: Arc<RequestRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Receiver of failures. Defaults to [`TracingReporter`].
    pub fn reporter<R>(mut self, reporter: R) -> Self
    where
        R: ErrorReporter + 'static,
    {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Instance interceptors, run on every request of this client.
    pub fn interceptors(mut self, interceptors: Interceptors) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<RequestClient, ConfigError> {
        let global = GlobalInterceptors::new(&self.config, self.reporter)?;
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let mut storage = self.storage;
                if let Some(store) = self.object_store {
                    storage = storage.object_store_with_ttl(store, self.config.object_store_ttl);
                }
                RequestRegistry::shared(storage.build())
            }
        };

        Ok(RequestClient {
            transport: self.transport,
            deduplicator: RequestDeduplicator::new(registry.clone()),
            registry,
            global,
            interceptors: self.interceptors,
            retry_delay: self.config.retry_delay,
            concurrency: self.config.concurrency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryStatus;
    use async_trait::async_trait;
    use fetchbox_core::{TransportError, TransportRequest, TransportResponse};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Delayed {
        delay: Duration,
        body: Value,
        calls: AtomicUsize,
    }

    impl Delayed {
        fn new(delay: Duration, body: Value) -> Arc<Self> {
            Arc::new(Self {
                delay,
                body,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Delayed {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(TransportResponse::new(200, self.body.clone()))
        }
    }

    struct Failing;

    #[async_trait]
    impl Transport for Failing {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Network("refused".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn user_body() -> Value {
        json!({"code": 200, "data": {"name": "a"}})
    }

    #[tokio::test]
    async fn test_request_deserializes_data() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct User {
            name: String,
        }

        let transport = Delayed::new(Duration::ZERO, user_body());
        let client = RequestClient::builder(transport).build().unwrap();
        let user: User = client.request(RequestDescriptor::get("/users")).await.unwrap();
        assert_eq!(user, User { name: "a".into() });
    }

    #[tokio::test]
    async fn test_decode_error() {
        let transport = Delayed::new(Duration::ZERO, user_body());
        let client = RequestClient::builder(transport).build().unwrap();
        let err = client
            .request::<Vec<u32>>(RequestDescriptor::get("/users"))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_dispatch_hands_the_key_to_one_waiter() {
        let transport = Delayed::new(Duration::from_millis(100), user_body());
        let client = RequestClient::builder(transport.clone()).build().unwrap();
        let descriptor = RequestDescriptor::get("/users").cache(true);
        let key = descriptor.cache_key();

        let spawn = |client: &RequestClient| {
            let client = client.clone();
            let descriptor = descriptor.clone();
            tokio::spawn(async move { client.request_value(descriptor).await })
        };

        let first = spawn(&client);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waiters: Vec<_> = (0..3).map(|_| spawn(&client)).collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.registry().waiting(&key), 3);

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        tokio::time::sleep(Duration::from_millis(10)).await;
        // One waiter re-claimed the key, the other two queued behind it.
        assert_eq!(client.registry().status(&key), Some(EntryStatus::Pending));
        assert_eq!(client.registry().waiting(&key), 2);

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(json!({"name": "a"})));
        }
        assert_eq!(transport.calls(), 2);
        assert_eq!(client.registry().status(&key), Some(EntryStatus::Complete));
    }

    #[tokio::test]
    async fn test_unclaimed_dispatch_leaves_the_key_alone() {
        let transport = Arc::new(Failing);
        let client = RequestClient::builder(transport).build().unwrap();
        let descriptor = RequestDescriptor::get("/users").cache(true);
        let key = descriptor.cache_key();
        let cache = CacheService::new(client.registry().clone(), descriptor.storage);

        // Another caller owns the key and has a waiter queued on it.
        assert!(matches!(
            cache.determine_cache(true, &key).await,
            CacheDecision::Dispatch
        ));
        let CacheDecision::Wait(mut rx) = cache.determine_cache(true, &key).await else {
            panic!("expected wait");
        };

        let result = client.handle_request(&descriptor, &key, &cache, false).await;

        assert!(matches!(result, Err(RequestError::Transport(_))));
        assert_eq!(client.registry().status(&key), Some(EntryStatus::Pending));
        assert_eq!(client.registry().waiting(&key), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_instance_interceptors_wrap_every_request() {
        let transport = Delayed::new(Duration::ZERO, user_body());
        let client = RequestClient::builder(transport)
            .interceptors(Interceptors::new().on_response(|mut envelope| {
                envelope.data = json!({"wrapped": envelope.data});
                Ok(envelope)
            }))
            .build()
            .unwrap();

        let value = client
            .request_value(RequestDescriptor::get("/users"))
            .await
            .unwrap();
        assert_eq!(value, json!({"wrapped": {"name": "a"}}));
    }

    #[tokio::test]
    async fn test_request_interceptor_error_is_caught() {
        let transport = Delayed::new(Duration::ZERO, user_body());
        let client = RequestClient::builder(transport.clone())
            .interceptors(
                Interceptors::new()
                    .on_request(|_| Err(RequestError::Interceptor("blocked".into())))
                    .on_request_error(|_| RequestError::Interceptor("caught".into())),
            )
            .build()
            .unwrap();

        let err = client
            .request_value(RequestDescriptor::get("/users"))
            .await
            .unwrap_err();
        assert_eq!(err, RequestError::Interceptor("caught".into()));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_executor_uses_configured_limit() {
        let client = RequestClient::builder(Delayed::new(Duration::ZERO, Value::Null))
            .config(ClientConfig {
                concurrency: ConcurrencyLimit::new(2).unwrap(),
                ..Default::default()
            })
            .build()
            .unwrap();
        let executor = client.executor::<u32, u32, ()>();
        assert_eq!(executor.limit().get(), 2);
    }
}
