use std::time::Duration;

use http::Method;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::{CacheKey, Interceptors, RequestError, ResponseEnvelope, StorageTarget};

/// Everything a caller specifies about one logical request.
///
/// Built with chained setters:
///
/// ```
/// use fetchbox_core::{RequestDescriptor, StorageTarget};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let descriptor = RequestDescriptor::get("/users")
///     .params(json!({"id": 1}))
///     .cache(true)
///     .storage(StorageTarget::Session)
///     .retry(2)
///     .retry_delay(Duration::from_millis(10));
///
/// assert_eq!(descriptor.cache_key().as_str(), "/users?id=1");
/// ```
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    /// Request path, resolved by the transport against its base URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Query params for GET, JSON body otherwise.
    pub params: Option<Value>,
    /// Extra request headers.
    pub headers: HeaderMap,
    /// Serve from and store into the response cache.
    pub cache: bool,
    /// Where cached bodies are stored.
    pub storage: StorageTarget,
    /// How many times a failed request is re-sent. Zero disables retries.
    pub retry: u32,
    /// Delay before each retry. Falls back to the client default.
    pub retry_delay: Option<Duration>,
    /// Cancel this request if an identical one is already in flight.
    pub cancel_on_duplicate: bool,
    /// Per-call hooks.
    pub interceptors: Interceptors,
}

impl RequestDescriptor {
    /// A request with every switch off.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            params: None,
            headers: HeaderMap::new(),
            cache: false,
            storage: StorageTarget::default(),
            retry: 0,
            retry_delay: None,
            cancel_on_duplicate: false,
            interceptors: Interceptors::default(),
        }
    }

    /// A GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// A POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Sets query or body params.
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets params from any serializable value.
    pub fn try_params<T: Serialize>(mut self, params: &T) -> Result<Self, RequestError> {
        self.params = Some(serde_json::to_value(params)?);
        Ok(self)
    }

    /// Adds a request header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Enables or disables response caching.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Picks the storage target for cached bodies.
    pub fn storage(mut self, target: StorageTarget) -> Self {
        self.storage = target;
        self
    }

    /// Sets the retry budget.
    pub fn retry(mut self, budget: u32) -> Self {
        self.retry = budget;
        self
    }

    /// Sets the delay between retries.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Cancels this request when an identical one is already in flight.
    pub fn cancel_on_duplicate(mut self, enabled: bool) -> Self {
        self.cancel_on_duplicate = enabled;
        self
    }

    /// Sets the per-call request interceptor.
    pub fn request_interceptor<F>(mut self, hook: F) -> Self
    where
        F: Fn(RequestDescriptor) -> Result<RequestDescriptor, RequestError> + Send + Sync + 'static,
    {
        self.interceptors = self.interceptors.on_request(hook);
        self
    }

    /// Sets the per-call response interceptor.
    pub fn response_interceptor<F>(mut self, hook: F) -> Self
    where
        F: Fn(ResponseEnvelope) -> Result<ResponseEnvelope, RequestError> + Send + Sync + 'static,
    {
        self.interceptors = self.interceptors.on_response(hook);
        self
    }

    /// Key shared by identical requests.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_request(&self.url, self.params.as_ref())
    }

    /// Only GET and POST responses take part in caching.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET || self.method == Method::POST
    }

    /// Whether this request reads from and writes to the response cache.
    pub fn uses_cache(&self) -> bool {
        self.cache && !self.url.is_empty() && self.is_cacheable_method()
    }
}
