//! Interceptor hooks.
//!
//! Interceptors run at three levels: built-in global interceptors owned by
//! the client, instance interceptors registered when the client is built, and
//! per-call interceptors carried by a [`RequestDescriptor`]. Per-call hooks
//! only use [`Interceptors::request`] and [`Interceptors::response`].

use std::fmt;
use std::sync::Arc;

use crate::{RequestDescriptor, RequestError, ResponseEnvelope};

/// Rewrites a request before it is dispatched.
pub type RequestInterceptor =
    Arc<dyn Fn(RequestDescriptor) -> Result<RequestDescriptor, RequestError> + Send + Sync>;

/// Rewrites a response envelope after it arrives.
pub type ResponseInterceptor =
    Arc<dyn Fn(ResponseEnvelope) -> Result<ResponseEnvelope, RequestError> + Send + Sync>;

/// Maps a failure raised while a request or response was being processed.
pub type ErrorInterceptor = Arc<dyn Fn(RequestError) -> RequestError + Send + Sync>;

/// A set of optional interceptor hooks.
#[derive(Clone, Default)]
pub struct Interceptors {
    /// Runs on the outgoing request.
    pub request: Option<RequestInterceptor>,
    /// Runs when preparing the request failed.
    pub request_catch: Option<ErrorInterceptor>,
    /// Runs on the incoming response envelope.
    pub response: Option<ResponseInterceptor>,
    /// Runs when the transport or a response check failed.
    pub response_catch: Option<ErrorInterceptor>,
}

impl Interceptors {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request hook.
    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(RequestDescriptor) -> Result<RequestDescriptor, RequestError> + Send + Sync + 'static,
    {
        self.request = Some(Arc::new(hook));
        self
    }

    /// Sets the request failure hook.
    pub fn on_request_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(RequestError) -> RequestError + Send + Sync + 'static,
    {
        self.request_catch = Some(Arc::new(hook));
        self
    }

    /// Sets the response hook.
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(ResponseEnvelope) -> Result<ResponseEnvelope, RequestError> + Send + Sync + 'static,
    {
        self.response = Some(Arc::new(hook));
        self
    }

    /// Sets the response failure hook.
    pub fn on_response_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(RequestError) -> RequestError + Send + Sync + 'static,
    {
        self.response_catch = Some(Arc::new(hook));
        self
    }

    /// Applies the request hook, if any.
    pub fn intercept_request(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor, RequestError> {
        match &self.request {
            Some(hook) => hook(descriptor),
            None => Ok(descriptor),
        }
    }

    /// Applies the response hook, if any.
    pub fn intercept_response(
        &self,
        envelope: ResponseEnvelope,
    ) -> Result<ResponseEnvelope, RequestError> {
        match &self.response {
            Some(hook) => hook(envelope),
            None => Ok(envelope),
        }
    }

    /// Applies the request failure hook, if any.
    pub fn catch_request(&self, err: RequestError) -> RequestError {
        match &self.request_catch {
            Some(hook) => hook(err),
            None => err,
        }
    }

    /// Applies the response failure hook, if any.
    pub fn catch_response(&self, err: RequestError) -> RequestError {
        match &self.response_catch {
            Some(hook) => hook(err),
            None => err,
        }
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("request", &self.request.is_some())
            .field("request_catch", &self.request_catch.is_some())
            .field("response", &self.response.is_some())
            .field("response_catch", &self.response_catch.is_some())
            .finish()
    }
}
