use axum_test::TestServer;
use orchestrator::SourceEndpoint;
use serde_json::{json, Value};
use server::config::ServiceConfig;
use server::{create_router, state::AppState};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup_test_server(config: ServiceConfig) -> (TestServer, AppState) {
    let state = AppState::new(config);
    let app = create_router(state.clone());
    let server = TestServer::new(app).expect("Failed to create test server");
    (server, state)
}

async fn mock_places() -> MockServer {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "p-1",
                "name": "Pinstripes Lanes",
                "address": "12 Queen St W",
                "coordinates": {"lat": 43.6510, "lng": -79.3820},
                "rating": 4.6
            },
            {
                "id": "p-2",
                "name": "Bowlerama West",
                "coordinates": {"lat": 43.6420, "lng": -79.4200},
                "rating": 4.1
            },
            {
                "id": "p-3",
                "name": "Strike Zone",
                "coordinates": {"lat": 43.6700, "lng": -79.3900},
                "rating": 3.8
            }
        ])))
        .mount(&mock)
        .await;
    mock
}

fn places_config(mock: &MockServer) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.endpoints.sources.push(SourceEndpoint {
        name: "places".to_string(),
        url: format!("{}/search", mock.uri()),
    });
    config
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _state) = setup_test_server(ServiceConfig::default());

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sources"], 0);
    }

    #[tokio::test]
    async fn test_openapi_document_lists_plan_route() {
        let (server, _state) = setup_test_server(ServiceConfig::default());

        let response = server.get("/api/openapi.json").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["paths"]["/api/plan"].is_object());
        assert!(body["paths"]["/api/events"].is_object());
    }
}

mod plan {
    use super::*;

    #[tokio::test]
    async fn test_malformed_request_returns_400_with_field() {
        let (server, _state) = setup_test_server(ServiceConfig::default());

        let response = server
            .post("/api/plan")
            .json(&json!({
                "prompt": "bowling",
                "group_size": 0
            }))
            .await;

        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "request_malformed");
        assert_eq!(body["field"], "group_size");
        assert!(body["message"].as_str().unwrap().contains("group_size"));
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected() {
        let (server, _state) = setup_test_server(ServiceConfig::default());

        let response = server
            .post("/api/plan")
            .json(&json!({ "prompt": "   " }))
            .await;

        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["field"], "prompt");
    }

    #[tokio::test]
    async fn test_nothing_configured_returns_flagged_empty_result() {
        let (server, _state) = setup_test_server(ServiceConfig::default());

        let response = server
            .post("/api/plan")
            .json(&json!({ "prompt": "bowling for 6", "group_size": 6 }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["venues"].as_array().unwrap().len(), 0);
        assert_eq!(body["execution"]["attempts"], 3);
        assert_eq!(body["execution"]["exhausted"], true);
    }

    #[tokio::test]
    async fn test_plan_ranks_venues_from_http_source() {
        let mock = mock_places().await;
        let (server, _state) = setup_test_server(places_config(&mock));

        let response = server
            .post("/api/plan")
            .json(&json!({
                "prompt": "bowling for 6",
                "group_size": 6,
                "location": "Toronto"
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        let venues = body["venues"].as_array().unwrap();
        assert_eq!(venues.len(), 3);
        assert_eq!(venues[0]["rank"], 1);
        for venue in venues {
            assert!(!venue["rationale"].as_str().unwrap().is_empty());
            assert!(venue["risk_warning"]
                .as_str()
                .unwrap()
                .contains("unchecked"));
        }
        assert!(body["summary"].as_str().unwrap().starts_with("Top pick"));
        assert_eq!(body["execution"]["attempts"], 1);
        assert_eq!(body["execution"]["exhausted"], false);
    }

    #[tokio::test]
    async fn test_api_key_sent_as_bearer_token() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1..)
            .mount(&mock)
            .await;

        let mut config = places_config(&mock);
        config.endpoints.api_key = Some("secret-key".to_string());
        let (server, _state) = setup_test_server(config);

        server
            .post("/api/plan")
            .json(&json!({ "prompt": "karaoke" }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_plan_progress_mirrored_on_event_bus() {
        let mock = mock_places().await;
        let (server, state) = setup_test_server(places_config(&mock));
        let mut rx = state.event_bus.subscribe();

        let response = server
            .post("/api/plan")
            .json(&json!({ "prompt": "bowling" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        let request_id = body["execution"]["request_id"].as_str().unwrap().to_string();

        let mut last_sequence = 0;
        let mut terminal = 0;
        while let Ok(envelope) = rx.try_recv() {
            assert_eq!(envelope.request_id.to_string(), request_id);
            assert!(envelope.sequence > last_sequence);
            last_sequence = envelope.sequence;
            if envelope.is_terminal() {
                terminal += 1;
            }
        }
        assert_eq!(terminal, 1);
    }
}

mod config {
    use super::*;

    #[tokio::test]
    async fn test_config_file_drives_pipeline() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ServiceConfig::default();
        config.pipeline.max_retries = 0;
        config.write(temp_dir.path()).await.unwrap();

        let loaded = ServiceConfig::read(temp_dir.path()).await;
        let (server, state) = setup_test_server(loaded);
        assert_eq!(state.service.config().max_retries, 0);

        let response = server
            .post("/api/plan")
            .json(&json!({ "prompt": "bowling" }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["execution"]["attempts"], 1);
    }
}
