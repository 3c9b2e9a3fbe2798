//! Interceptor ordering and error reporting through a real client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fetchbox::{
    ClientConfig, EntryStatus, Interceptors, LogoutReason, RequestClient, RequestDescriptor,
    RequestError, TransportError, TransportResponse,
};
use fetchbox_test::{MockTransport, RecordingReporter, Report};
use pretty_assertions::assert_eq;
use serde_json::json;

fn user_body() -> serde_json::Value {
    json!({"code": 200, "data": {"name": "a"}})
}

#[tokio::test]
async fn test_default_headers_and_token_reach_the_transport() {
    let transport = MockTransport::responding(user_body());
    let client = RequestClient::builder(transport.clone())
        .config(ClientConfig {
            default_headers: BTreeMap::from([("x-app".to_owned(), "dashboard".to_owned())]),
            auth_token: Some("secret".to_owned()),
            ..Default::default()
        })
        .build()
        .unwrap();

    client.request_value(RequestDescriptor::get("/users")).await.unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.headers.get("x-app").unwrap(), "dashboard");
    assert_eq!(request.headers.get("authorization").unwrap(), "Bearer secret");
}

#[tokio::test]
async fn test_call_request_interceptor_runs_before_the_key_is_computed() {
    let transport = MockTransport::responding(user_body());
    let client = RequestClient::builder(transport.clone()).build().unwrap();

    let descriptor = RequestDescriptor::get("/users")
        .params(json!({"id": 1}))
        .cache(true)
        .request_interceptor(|descriptor| Ok(descriptor.params(json!({"id": 2}))));
    client.request_value(descriptor).await.unwrap();

    assert_eq!(transport.last_request().unwrap().query, Some(json!({"id": 2})));
    let rewritten = RequestDescriptor::get("/users").params(json!({"id": 2}));
    let original = RequestDescriptor::get("/users").params(json!({"id": 1}));
    assert_eq!(
        client.registry().status(&rewritten.cache_key()),
        Some(EntryStatus::Complete)
    );
    assert_eq!(client.registry().status(&original.cache_key()), None);
}

#[tokio::test]
async fn test_call_request_interceptor_error_skips_dispatch() {
    let transport = MockTransport::responding(user_body());
    let client = RequestClient::builder(transport.clone()).build().unwrap();

    let err = client
        .request_value(
            RequestDescriptor::get("/users")
                .request_interceptor(|_| Err(RequestError::Interceptor("blocked".into()))),
        )
        .await
        .unwrap_err();

    assert_eq!(err, RequestError::Interceptor("blocked".into()));
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test]
async fn test_call_response_interceptor_result_is_cached() {
    let transport = MockTransport::responding(user_body());
    let client = RequestClient::builder(transport.clone()).build().unwrap();

    let first = client
        .request_value(
            RequestDescriptor::get("/users")
                .cache(true)
                .response_interceptor(|mut envelope| {
                    envelope.data = json!("rewritten");
                    Ok(envelope)
                }),
        )
        .await;
    let second = client
        .request_value(RequestDescriptor::get("/users").cache(true))
        .await;

    assert_eq!(first, Ok(json!("rewritten")));
    assert_eq!(second, Ok(json!("rewritten")));
    assert_eq!(transport.send_count(), 1);
}

#[tokio::test]
async fn test_instance_response_hooks_see_every_attempt() {
    let transport = MockTransport::responding(user_body())
        .then(Ok(TransportResponse::new(500, json!(null))));
    let seen = Arc::new(AtomicUsize::new(0));
    let caught = Arc::new(AtomicUsize::new(0));

    let interceptors = Interceptors::new()
        .on_response({
            let seen = seen.clone();
            move |envelope| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(envelope)
            }
        })
        .on_response_error({
            let caught = caught.clone();
            move |err| {
                caught.fetch_add(1, Ordering::SeqCst);
                err
            }
        });
    let client = RequestClient::builder(transport.clone())
        .interceptors(interceptors)
        .build()
        .unwrap();

    let result = client
        .request_value(
            RequestDescriptor::get("/users")
                .retry(1)
                .retry_delay(std::time::Duration::from_millis(1)),
        )
        .await;

    assert_eq!(result, Ok(json!({"name": "a"})));
    assert_eq!(caught.load(Ordering::SeqCst), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_response_catch_can_replace_the_error() {
    let transport = MockTransport::responding_status(404, json!(null));
    let reporter = RecordingReporter::new();
    let client = RequestClient::builder(transport)
        .reporter(reporter.clone())
        .interceptors(
            Interceptors::new()
                .on_response_error(|_| RequestError::Interceptor("not found".into())),
        )
        .build()
        .unwrap();

    let err = client
        .request_value(RequestDescriptor::get("/missing"))
        .await
        .unwrap_err();

    assert_eq!(err, RequestError::Interceptor("not found".into()));
    // No longer a transport failure, so nothing is reported.
    assert!(reporter.is_empty());
}

#[tokio::test]
async fn test_unauthorized_status_ends_the_session() {
    let reporter = RecordingReporter::new();
    let client = RequestClient::builder(MockTransport::responding_status(401, json!(null)))
        .reporter(reporter.clone())
        .build()
        .unwrap();

    client
        .request_value(RequestDescriptor::get("/users"))
        .await
        .unwrap_err();

    assert_eq!(
        reporter.reports(),
        vec![
            Report::Network {
                status: Some(401),
                message: "Unauthorized, please sign in again".to_owned()
            },
            Report::Logout(LogoutReason::Status(401)),
        ]
    );
}

#[tokio::test]
async fn test_expired_session_code_is_reported_but_returned() {
    let reporter = RecordingReporter::new();
    let transport = MockTransport::responding(json!({"code": 10031, "data": {"name": "a"}}));
    let client = RequestClient::builder(transport)
        .reporter(reporter.clone())
        .build()
        .unwrap();

    let result = client.request_value(RequestDescriptor::get("/users")).await;

    assert_eq!(result, Ok(json!({"name": "a"})));
    assert_eq!(
        reporter.reports(),
        vec![
            Report::Auth {
                code: 10031,
                message: "Session is no longer valid, please sign in again".to_owned()
            },
            Report::Logout(LogoutReason::AuthCode(10031)),
        ]
    );
}

#[tokio::test]
async fn test_error_code_body_is_reported_as_general_error() {
    let reporter = RecordingReporter::new();
    let transport = MockTransport::responding(json!({"errno": 0, "errmsg": "bad input"}));
    let client = RequestClient::builder(transport)
        .reporter(reporter.clone())
        .build()
        .unwrap();

    let result = client.request_value(RequestDescriptor::get("/users")).await;

    assert_eq!(result, Ok(json!(null)));
    assert_eq!(
        reporter.reports(),
        vec![Report::General {
            message: "bad input".to_owned()
        }]
    );
}

#[tokio::test]
async fn test_redirected_failure_ends_the_session() {
    let mut response = TransportResponse::new(500, json!(null));
    response.redirected = true;
    let reporter = RecordingReporter::new();
    let client = RequestClient::builder(MockTransport::new().then(Ok(response)))
        .reporter(reporter.clone())
        .build()
        .unwrap();

    client
        .request_value(RequestDescriptor::get("/users"))
        .await
        .unwrap_err();

    assert_eq!(reporter.logouts(), vec![LogoutReason::Redirected]);
}

#[tokio::test]
async fn test_unreachable_server() {
    let reporter = RecordingReporter::new();
    let client = RequestClient::builder(MockTransport::failing(TransportError::Network(
        "connection refused".into(),
    )))
    .reporter(reporter.clone())
    .build()
    .unwrap();

    client
        .request_value(RequestDescriptor::get("/users"))
        .await
        .unwrap_err();

    assert_eq!(
        reporter.reports(),
        vec![Report::Network {
            status: None,
            message: "Unable to connect to the server".to_owned()
        }]
    );
    assert!(reporter.logouts().is_empty());
}

#[tokio::test]
async fn test_auth_code_is_detected_alongside_legacy_fields() {
    let reporter = RecordingReporter::new();
    let transport = MockTransport::responding(json!({"code": 10031, "errno": 0, "data": 1}));
    let client = RequestClient::builder(transport)
        .reporter(reporter.clone())
        .build()
        .unwrap();

    let result = client.request_value(RequestDescriptor::get("/users")).await;

    assert_eq!(result, Ok(json!(1)));
    assert_eq!(reporter.logouts(), vec![LogoutReason::AuthCode(10031)]);
}
