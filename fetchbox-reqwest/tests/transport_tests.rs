//! Integration tests for ReqwestTransport using wiremock.

use fetchbox::{ClientConfig, RequestClient, RequestDescriptor, Transport, TransportError, TransportRequest};
use fetchbox_reqwest::ReqwestTransport;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> ReqwestTransport {
    ReqwestTransport::default().with_base_url(&server.uri()).unwrap()
}

#[tokio::test]
async fn test_get_sends_query_and_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("id", "1"))
        .and(header("x-app", "fetchbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": {"name": "a"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let descriptor = RequestDescriptor::get("/users")
        .params(json!({"id": 1}))
        .header("x-app".parse().unwrap(), "fetchbox".parse().unwrap());

    let response = transport(&mock_server)
        .send(TransportRequest::from_descriptor(&descriptor))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"code": 200, "data": {"name": "a"}}));
    assert!(!response.redirected);
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "a"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let descriptor = RequestDescriptor::post("/users").params(json!({"name": "a"}));
    let response = transport(&mock_server)
        .send(TransportRequest::from_descriptor(&descriptor))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_error_status_is_a_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let response = transport(&mock_server)
        .send(TransportRequest::from_descriptor(&RequestDescriptor::get("/down")))
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(response.body, json!("maintenance"));
}

#[tokio::test]
async fn test_followed_redirect_is_flagged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/login", mock_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&mock_server)
        .await;

    let response = transport(&mock_server)
        .send(TransportRequest::from_descriptor(&RequestDescriptor::get("/private")))
        .await
        .unwrap();

    assert!(response.redirected);
    assert_eq!(response.body, serde_json::Value::Null);
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    // Nothing listens on port 1.
    let err = ReqwestTransport::default()
        .with_base_url("http://127.0.0.1:1")
        .unwrap()
        .send(TransportRequest::from_descriptor(&RequestDescriptor::get("/users")))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Network(_)));
}

#[tokio::test]
async fn test_client_caches_through_reqwest() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": [{"name": "a"}]
        })))
        .expect(1) // Served from the cache the second time
        .mount(&mock_server)
        .await;

    let config = ClientConfig {
        base_url: Some(mock_server.uri()),
        ..Default::default()
    };
    let client = RequestClient::builder(ReqwestTransport::from_config(&config).unwrap())
        .config(config)
        .build()
        .unwrap();

    for _ in 0..2 {
        let users = client
            .request_value(RequestDescriptor::get("/users").cache(true))
            .await
            .unwrap();
        assert_eq!(users, json!([{"name": "a"}]));
    }
}
