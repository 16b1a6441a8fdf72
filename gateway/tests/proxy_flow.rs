//! Integration tests exercising the gateway's boundary scenarios (spec.md
//! §8) end to end through the real axum `Router`, the way the teacher
//! tests its frontend handlers directly rather than binding a socket.
//! Upstreams are `wiremock` servers; the Store is the in-memory double.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Local, TimeZone, Utc};
use entities::app;
use gateway::app::{router, GatewayState};
use gateway::config::{AppConfig, TomlChain};
use gateway::store::InMemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_app(api_key: Uuid, max_rps: i32, daily_limit: i64) -> app::Model {
    app::Model {
        id: 0,
        owner_user_id: 1,
        name: "test-app".into(),
        description: None,
        api_key,
        chain_name: "sepolia".into(),
        chain_id: "11155111".into(),
        max_rps,
        daily_requests_limit: daily_limit,
        total_requests: 0,
        daily_requests: 0,
        last_reset_date: Local::now().date_naive(),
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn build_state(execution_url: &str, store: Arc<InMemoryStore>) -> Arc<GatewayState> {
    let config = AppConfig {
        port: 0,
        database_url: None,
        workers: 1,
        toml_chains: vec![TomlChain {
            name: "sepolia".into(),
            chain_id: "11155111".into(),
            enabled: true,
            execution_urls: vec![execution_url.to_string()],
            consensus_urls: vec![],
            prometheus_urls: vec![],
        }],
        default_max_rps: 10,
        default_daily_requests: 100_000,
        health_sample_interval: Duration::from_secs(30),
    };

    GatewayState::build(config, store).await.expect("state builds")
}

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[tokio::test]
async fn happy_path_exec_forward_increments_counters_and_sets_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "0x10a3b5c"})))
        .mount(&mock_server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let key = Uuid::new_v4();
    store.insert_app(sample_app(key, 10, 1000));

    let state = build_state(&mock_server.uri(), store).await;
    let app = router(state);

    let body = json!({"jsonrpc": "2.0", "method": "eth_blockNumber", "params": [], "id": 1});
    let request = Request::builder()
        .method("POST")
        .uri(format!("/sepolia/exec/{key}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-endpoint-type").unwrap(),
        "sepolia-execution"
    );
    assert!(response.headers().get("x-response-time").is_some());

    let body = read_body(response).await;
    assert_eq!(body["result"], "0x10a3b5c");
}

#[tokio::test]
async fn invalid_key_is_rejected_before_any_upstream_call() {
    let mock_server = MockServer::start().await;
    // No mock registered: a call reaching the upstream would fail wiremock's
    // unexpected-request assertion when the server is dropped.

    let store = Arc::new(InMemoryStore::new());
    let state = build_state(&mock_server.uri(), store).await;
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/sepolia/exec/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = read_body(response).await;
    assert_eq!(body["error"], "Invalid or inactive API key");
}

#[tokio::test]
async fn chain_mismatch_is_rejected_before_any_upstream_call() {
    let mock_server = MockServer::start().await;

    let store = Arc::new(InMemoryStore::new());
    let key = Uuid::new_v4();
    store.insert_app(sample_app(key, 10, 1000)); // bound to "sepolia"

    let state = build_state(&mock_server.uri(), store).await;
    let app = router(state);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/arbitrum/exec/{key}/x"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = read_body(response).await;
    assert_eq!(body["expectedChain"], "sepolia");
}

#[tokio::test]
async fn rate_limit_denies_the_third_rapid_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "0x1"})))
        .mount(&mock_server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let key = Uuid::new_v4();
    store.insert_app(sample_app(key, 2, 1000));

    let state = build_state(&mock_server.uri(), store).await;
    let app = router(state);

    let make_request = || {
        Request::builder()
            .method("POST")
            .uri(format!("/sepolia/exec/{key}"))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json!({"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":1})).unwrap()))
            .unwrap()
    };

    let first = app.clone().oneshot(make_request()).await.unwrap();
    let second = app.clone().oneshot(make_request()).await.unwrap();
    let third = app.clone().oneshot(make_request()).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = read_body(third).await;
    assert_eq!(body["limit"], 2);
    assert_eq!(body["remaining"], 0);
}

#[tokio::test]
async fn daily_quota_at_limit_returns_429_and_still_increments() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "0x1"})))
        .mount(&mock_server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let key = Uuid::new_v4();
    let mut seeded = sample_app(key, 10, 3);
    seeded.daily_requests = 3;
    let id = store.insert_app(seeded);

    let state = build_state(&mock_server.uri(), store.clone()).await;
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/sepolia/exec/{key}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":1})).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // The increment happened before the limit check, per spec.md §4.3/§7.
    let after = store.app_by_id(id).unwrap();
    assert_eq!(after.daily_requests, 4);

    let body = read_body(response).await;
    assert_eq!(body["error"], "Daily request limit exceeded");
}

#[tokio::test]
async fn first_request_on_a_new_day_is_admitted_with_daily_requests_reset_to_one() {
    // spec.md §8 scenario 5: an App parked at its limit on a stale
    // `last_reset_date` must be admitted on the new day with
    // `dailyRequests == 1`, not `0` (wiped by a reset after the increment)
    // and not the old count plus one (counted against the stale day).
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "0x1"})))
        .mount(&mock_server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let key = Uuid::new_v4();
    let mut seeded = sample_app(key, 10, 3);
    seeded.daily_requests = 3;
    seeded.last_reset_date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().date_naive();
    let id = store.insert_app(seeded);

    let state = build_state(&mock_server.uri(), store.clone()).await;
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/sepolia/exec/{key}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":1})).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let after = store.app_by_id(id).unwrap();
    assert_eq!(after.daily_requests, 1);
    assert_eq!(after.last_reset_date, Local::now().date_naive());
}

#[tokio::test]
async fn upstream_connection_failure_is_reported_as_bad_gateway() {
    // Nothing listening on this address.
    let store = Arc::new(InMemoryStore::new());
    let key = Uuid::new_v4();
    store.insert_app(sample_app(key, 10, 1000));

    let state = build_state("http://127.0.0.1:1", store).await;
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/sepolia/exec/{key}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":1})).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = read_body(response).await;
    assert_eq!(body["endpointType"], "sepolia-execution");
}

#[tokio::test]
async fn unconfigured_section_is_not_found() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(InMemoryStore::new());
    let key = Uuid::new_v4();
    store.insert_app(sample_app(key, 10, 1000));

    // build_state only wires an execution URL; consensus is left unset.
    let state = build_state(&mock_server.uri(), store).await;
    let app = router(state);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/sepolia/cons/{key}/eth/v1/node/syncing"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_exposes_text_format_without_auth() {
    gateway::metrics::init();

    let mock_server = MockServer::start().await;
    let store = Arc::new(InMemoryStore::new());
    let state = build_state(&mock_server.uri(), store).await;
    let app = router(state);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("rpc_gateway_active_connections"));
}

#[tokio::test]
async fn health_endpoint_reports_unknown_chain_as_not_found() {
    let mock_server = MockServer::start().await;
    let store = Arc::new(InMemoryStore::new());
    let state = build_state(&mock_server.uri(), store).await;
    let app = router(state);

    let request = Request::builder()
        .uri("/health/not-a-real-chain")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
