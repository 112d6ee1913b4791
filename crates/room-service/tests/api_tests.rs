//! HTTP API tests for the room service.
//!
//! Drives the real router with `tower::ServiceExt::oneshot`; the client
//! address comes from `MockConnectInfo`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use room_service::config::Config;
use room_service::registry::RoomRegistry;
use room_service::routes::{build_routes, AppState};
use room_service::store::{MemoryRoomStore, RoomStore};
use room_service::throttle::JoinThrottle;
use serde_json::{json, Value};
use session_controller::relay::RelayHub;
use session_test_utils::ScriptedRoomStore;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const CLIENT: ([u8; 4], u16) = ([10, 0, 0, 1], 40000);
const OTHER_CLIENT: ([u8; 4], u16) = ([10, 0, 0, 2], 40000);

fn state_with(store: Arc<dyn RoomStore>) -> Arc<AppState> {
    let vars = HashMap::from([("ROOM_STORE".to_string(), "memory".to_string())]);
    let config = Config::from_vars(&vars).unwrap();
    Arc::new(AppState {
        registry: RoomRegistry::with_ring(store, config.room_ttl, config.room_code_max_attempts),
        throttle: Arc::new(JoinThrottle::new(
            config.join_rate_limit,
            config.join_rate_window,
        )),
        hub: RelayHub::new(),
        config,
    })
}

fn app(state: Arc<AppState>, client: ([u8; 4], u16)) -> Router {
    build_routes(state, None).layer(MockConnectInfo(SocketAddr::from(client)))
}

fn memory_app() -> Router {
    app(state_with(Arc::new(MemoryRoomStore::new())), CLIENT)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn create(app: &Router) -> String {
    let (status, body) = post(app, "/api/create-room", json!({"hostId": "host-1"})).await;
    assert_eq!(status, StatusCode::OK, "create failed: {body}");
    body["code"].as_str().unwrap().to_string()
}

// ============================================================================
// Create / join
// ============================================================================

#[tokio::test]
async fn test_create_then_join_case_insensitive() {
    let app = memory_app();
    let (status, body) = post(
        &app,
        "/api/create-room",
        json!({"hostId": "host-1", "meta": {"title": "Standup"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expiresIn"], 3600);
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 5);

    let (status, body) = post(
        &app,
        "/api/join-room",
        json!({"code": code.to_lowercase(), "userId": "guest-1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room"]["hostId"], "host-1");
    assert_eq!(body["room"]["meta"]["title"], "Standup");
    assert_eq!(body["room"]["participants"], json!([]));
    assert!(body["room"]["createdAt"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_create_requires_host_id() {
    let app = memory_app();
    let (status, body) = post(&app, "/api/create-room", json!({"hostId": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_join_requires_code_and_user() {
    let app = memory_app();
    let (status, body) = post(&app, "/api/join-room", json!({"code": "ABCDE"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Code and userId are required");
}

#[tokio::test]
async fn test_join_unknown_code_not_found() {
    let app = memory_app();
    for code in ["ZZZZZ", "bad"] {
        let (status, body) =
            post(&app, "/api/join-room", json!({"code": code, "userId": "u"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Room not found or expired");
    }
}

#[tokio::test]
async fn test_room_exists_endpoint() {
    let app = memory_app();
    let code = create(&app).await;

    let (status, body) = get(&app, &format!("/api/rooms/{code}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"exists": true}));

    let (status, _) = get(&app, "/api/rooms/NOPE9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Throttling
// ============================================================================

#[tokio::test]
async fn test_eleventh_join_is_rate_limited_not_not_found() {
    let state = state_with(Arc::new(MemoryRoomStore::new()));
    let limited = app(Arc::clone(&state), CLIENT);
    let other = app(state, OTHER_CLIENT);

    for _ in 0..10 {
        let (status, _) =
            post(&limited, "/api/join-room", json!({"code": "ZZZZZ", "userId": "u"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/join-room")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"code": "ZZZZZ", "userId": "u"}).to_string()))
        .unwrap();
    let response = limited.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // Existence checks share the same budget
    let (status, _) = get(&limited, "/api/rooms/ZZZZZ").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Another origin is unaffected
    let (status, _) =
        post(&other, "/api/join-room", json!({"code": "ZZZZZ", "userId": "u"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_room_creation_is_not_throttled() {
    let app = memory_app();
    for _ in 0..15 {
        create(&app).await;
    }
}

// ============================================================================
// Store behavior
// ============================================================================

#[tokio::test]
async fn test_collision_is_retried_transparently() {
    let store = ScriptedRoomStore::new();
    store.force_conflicts(1);
    let app = app(state_with(Arc::new(store.clone())), CLIENT);

    let code = create(&app).await;
    let keys = store.put_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[1], format!("room:{code}"));

    let (status, _) = post(&app, "/api/join-room", json!({"code": code, "userId": "u"})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_exhausted_code_space_is_unavailable() {
    let store = ScriptedRoomStore::new();
    store.force_conflicts(10);
    let app = app(state_with(Arc::new(store.clone())), CLIENT);

    let (status, body) = post(&app, "/api/create-room", json!({"hostId": "h"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["error"]["message"],
        "Failed to generate unique room code. Please try again."
    );
    assert_eq!(store.put_keys().len(), 10);
}

#[tokio::test]
async fn test_store_failure_is_internal_and_not_ready() {
    let store = ScriptedRoomStore::new();
    store.set_failing(true);
    let app = app(state_with(Arc::new(store)), CLIENT);

    let (status, body) = post(&app, "/api/create-room", json!({"hostId": "h"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "STORE_ERROR");

    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
}

#[tokio::test(start_paused = true)]
async fn test_room_expires_after_ttl() {
    let app = memory_app();
    let code = create(&app).await;

    tokio::time::advance(Duration::from_secs(3599)).await;
    let (status, _) = post(&app, "/api/join-room", json!({"code": code, "userId": "u"})).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::advance(Duration::from_secs(2)).await;
    let (status, body) = post(&app, "/api/join-room", json!({"code": code, "userId": "u"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Room not found or expired");
}

// ============================================================================
// Health and metrics
// ============================================================================

#[tokio::test]
async fn test_health_and_ready() {
    let app = memory_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");

    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ready", "store": "healthy"}));
}

#[tokio::test]
async fn test_metrics_route_only_with_handle() {
    let state = state_with(Arc::new(MemoryRoomStore::new()));

    let without = build_routes(Arc::clone(&state), None);
    let response = without
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let with = build_routes(state, Some(handle));
    let response = with
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
