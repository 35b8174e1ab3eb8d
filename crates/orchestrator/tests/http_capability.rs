use orchestrator::adapters::{invoke, Capability, ConsentDecision, ConsentRequest, HttpCapability};
use orchestrator::AdapterError;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn consent_request() -> ConsentRequest {
    ConsentRequest {
        user_id: "auth0|abc".to_string(),
        action: "send_email".to_string(),
        scopes: vec!["email.send".to_string()],
    }
}

async fn consent_capability(server: &MockServer) -> HttpCapability<ConsentRequest, ConsentDecision> {
    HttpCapability::new("consent", format!("{}/consent", server.uri()))
}

#[tokio::test]
async fn test_posts_json_and_decodes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/consent"))
        .and(body_partial_json(json!({"action": "send_email"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authorized": true})))
        .expect(1)
        .mount(&server)
        .await;

    let cap = consent_capability(&server).await;
    let decision = cap.call(&consent_request()).await.unwrap();
    assert!(decision.authorized);
}

#[tokio::test]
async fn test_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authorized": false})))
        .mount(&server)
        .await;

    let cap = consent_capability(&server).await.with_api_key("secret");
    let decision = cap.call(&consent_request()).await.unwrap();
    assert!(!decision.authorized);
}

#[tokio::test]
async fn test_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let cap = consent_capability(&server).await;
    let err = cap.call(&consent_request()).await.unwrap_err();
    assert_eq!(
        err,
        AdapterError::RateLimited {
            capability: "consent".to_string(),
            retry_after_secs: Some(7),
        }
    );
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cap = consent_capability(&server).await;
    let err = cap.call(&consent_request()).await.unwrap_err();
    assert_eq!(err.kind(), "unavailable");
}

#[tokio::test]
async fn test_client_error_and_bad_body_are_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/consent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("definitely not json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let cap = consent_capability(&server).await;
    let err = cap.call(&consent_request()).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_response");

    let missing: HttpCapability<ConsentRequest, ConsentDecision> =
        HttpCapability::new("consent", format!("{}/missing", server.uri()));
    let err = missing.call(&consent_request()).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_response");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_unavailable() {
    let cap: HttpCapability<ConsentRequest, ConsentDecision> =
        HttpCapability::new("consent", "http://127.0.0.1:1/consent");
    let err = cap.call(&consent_request()).await.unwrap_err();
    assert_eq!(err.kind(), "unavailable");
}

#[tokio::test]
async fn test_invoke_bounds_slow_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"authorized": true}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let cap = consent_capability(&server).await;
    let err = invoke(&cap, &consent_request(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
}
