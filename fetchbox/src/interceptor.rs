//! Interceptors every request passes through.
//!
//! The request side fills in configured default headers and the bearer
//! token. The response side rejects any status other than 200 and reports
//! application error codes carried in the body. Duplicate registration and
//! release live in [`RequestDeduplicator`](crate::RequestDeduplicator).

use std::sync::Arc;

use fetchbox_core::{
    RequestDescriptor, RequestError, ResponseEnvelope, TransportError, TransportRequest,
    TransportResponse,
};
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::report::{ErrorReporter, handle_auth_error, handle_general_error};
use crate::{ClientConfig, ConfigError};

/// Built-in request and response interceptors.
#[derive(Clone)]
pub struct GlobalInterceptors {
    default_headers: HeaderMap,
    authorization: Option<HeaderValue>,
    reporter: Arc<dyn ErrorReporter>,
}

impl std::fmt::Debug for GlobalInterceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalInterceptors")
            .field("default_headers", &self.default_headers.len())
            .field("authorization", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

impl GlobalInterceptors {
    /// Builds the interceptors from `config`, reporting through `reporter`.
    pub fn new(config: &ClientConfig, reporter: Arc<dyn ErrorReporter>) -> Result<Self, ConfigError> {
        Ok(Self {
            default_headers: config.header_map()?,
            authorization: config.authorization()?,
            reporter,
        })
    }

    /// The reporter failures are sent to.
    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    /// Turns `descriptor` into the request the transport sends.
    pub fn prepare(&self, descriptor: &RequestDescriptor) -> TransportRequest {
        let mut request = TransportRequest::from_descriptor(descriptor);
        self.handle_request_header(&mut request);
        self.handle_auth(&mut request);
        request
    }

    /// Adds default headers the request does not already carry.
    pub fn handle_request_header(&self, request: &mut TransportRequest) {
        for (name, value) in &self.default_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
    }

    /// Adds the bearer token unless the request already has credentials.
    pub fn handle_auth(&self, request: &mut TransportRequest) {
        if let Some(token) = &self.authorization
            && !request.headers.contains_key(AUTHORIZATION)
        {
            request.headers.insert(AUTHORIZATION, token.clone());
        }
    }

    /// Checks a transport response and unwraps its body envelope.
    ///
    /// Anything but 200 is a failure carrying the response. A 200 body whose
    /// code is an auth error or the generic error code is reported, and still
    /// returned to the caller.
    pub fn handle_response(
        &self,
        response: TransportResponse,
    ) -> Result<ResponseEnvelope, RequestError> {
        if response.status != 200 {
            return Err(TransportError::Status(response).into());
        }
        let envelope = ResponseEnvelope::from_body(response.body);
        handle_auth_error(self.reporter.as_ref(), envelope.code);
        handle_general_error(self.reporter.as_ref(), envelope.code, envelope.msg.as_deref());
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogoutReason;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ErrorReporter for Recorder {
        fn network_error(&self, status: Option<u16>, _message: &str) {
            self.0.lock().unwrap().push(format!("network {status:?}"));
        }
        fn auth_error(&self, code: i64, _message: &str) {
            self.0.lock().unwrap().push(format!("auth {code}"));
        }
        fn general_error(&self, message: &str) {
            self.0.lock().unwrap().push(format!("general {message}"));
        }
        fn force_logout(&self, reason: LogoutReason) {
            self.0.lock().unwrap().push(format!("logout {reason}"));
        }
    }

    fn interceptors(config: ClientConfig) -> (Arc<Recorder>, GlobalInterceptors) {
        let recorder = Arc::new(Recorder::default());
        let interceptors = GlobalInterceptors::new(&config, recorder.clone()).unwrap();
        (recorder, interceptors)
    }

    #[test]
    fn test_headers_and_auth_are_added() {
        let (_, interceptors) = interceptors(ClientConfig {
            default_headers: BTreeMap::from([("x-app".to_owned(), "fetchbox".to_owned())]),
            auth_token: Some("token".to_owned()),
            ..Default::default()
        });

        let request = interceptors.prepare(&RequestDescriptor::get("/users"));
        assert_eq!(request.headers.get("x-app").unwrap(), "fetchbox");
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer token");
    }

    #[test]
    fn test_request_headers_win() {
        let (_, interceptors) = interceptors(ClientConfig {
            default_headers: BTreeMap::from([("x-app".to_owned(), "fetchbox".to_owned())]),
            auth_token: Some("token".to_owned()),
            ..Default::default()
        });
        let descriptor = RequestDescriptor::get("/users")
            .header("x-app".parse().unwrap(), HeaderValue::from_static("custom"))
            .header(AUTHORIZATION, HeaderValue::from_static("Basic abc"));

        let request = interceptors.prepare(&descriptor);
        assert_eq!(request.headers.get("x-app").unwrap(), "custom");
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Basic abc");
    }

    #[test]
    fn test_non_200_is_an_error() {
        let (_, interceptors) = interceptors(ClientConfig::default());
        let err = interceptors
            .handle_response(TransportResponse::new(201, json!({})))
            .unwrap_err();
        assert_eq!(err.response().map(|r| r.status), Some(201));
    }

    #[test]
    fn test_application_errors_are_reported() {
        let (recorder, interceptors) = interceptors(ClientConfig::default());

        let envelope = interceptors
            .handle_response(TransportResponse::new(
                200,
                json!({"errno": 0, "errmsg": "bad input", "data": null}),
            ))
            .unwrap();
        assert_eq!(envelope.code, Some(0));

        interceptors
            .handle_response(TransportResponse::new(200, json!({"code": 10032})))
            .unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["general bad input", "auth 10032", "logout auth code 10032"]
        );
    }
}
