//! Integration tests for the ride-server HTTP API
//!
//! Uses tower::ServiceExt::oneshot to test routes directly without binding a port.

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::Request;
use ride_core::adapter::RideAdapter;
use ride_engine::{DemoRide, PlayerCommand};
use ride_server::{api::create_router, config::ServerConfig, manager, player, state::AppState};
use tower::ServiceExt;

/// Helper: build a router with fresh AppState (no adapters registered)
fn app() -> axum::Router {
    create_router(AppState::default())
}

/// Helper: build a router with AppState returned for further manipulation
fn app_with_state() -> (axum::Router, AppState) {
    let state = AppState::default();
    let router = create_router(state.clone());
    (router, state)
}

/// Helper: state with the demo ride started and one ride tick done
async fn riding_state() -> AppState {
    riding_state_with(ServerConfig::default()).await
}

async fn riding_state_with(config: ServerConfig) -> AppState {
    let state = AppState::new(config);
    state
        .register_adapter(Box::new(DemoRide::new().unwrap()))
        .await;
    manager::detection_cycle(&state).await.unwrap();
    // keep the synchronizer deterministic: only the test reports playback
    player::stop_player_task(&state).await;
    manager::ride_tick(&state).await.unwrap();
    state
}

/// Helper: collect response body into string
async fn body_string(body: Body) -> String {
    let collected = body.collect().await.unwrap();
    String::from_utf8(collected.to_bytes().to_vec()).unwrap()
}

async fn get_json(app: axum::Router, uri: &str) -> (u16, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = body_string(response.into_body()).await;
    (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

async fn post_json(app: axum::Router, uri: &str, json: serde_json::Value) -> (u16, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = body_string(response.into_body()).await;
    (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

// ==================== GET /api/adapters ====================

#[tokio::test]
async fn test_get_adapters_returns_200_with_empty_array() {
    let (status, parsed) = get_json(app(), "/api/adapters").await;

    assert_eq!(status, 200);
    assert!(parsed.is_array(), "Response should be a JSON array");
    assert_eq!(parsed.as_array().unwrap().len(), 0, "Array should be empty");
}

#[tokio::test]
async fn test_get_adapters_with_demo_ride_registered() {
    let (app, state) = app_with_state();
    state
        .register_adapter(Box::new(DemoRide::new().unwrap()))
        .await;

    let (status, parsed) = get_json(app, "/api/adapters").await;
    assert_eq!(status, 200);

    let adapters = parsed.as_array().unwrap();
    assert_eq!(adapters.len(), 1, "Should have one adapter");
    assert_eq!(adapters[0]["key"], "demo");
    assert_eq!(adapters[0]["detected"], true, "Demo ride is always detected");
    assert_eq!(adapters[0]["active"], false);
}

#[tokio::test]
async fn test_detection_starts_demo_ride() {
    let state = riding_state().await;
    let (status, parsed) = get_json(create_router(state.clone()), "/api/adapters").await;

    assert_eq!(status, 200);
    assert_eq!(parsed[0]["active"], true);
    assert_eq!(state.active_adapter.read().await.as_deref(), Some("demo"));
}

// ==================== Ride endpoints ====================

#[tokio::test]
async fn test_ride_endpoints_404_without_session() {
    for uri in ["/api/route", "/api/ride", "/api/ride/remaining", "/api/video/status"] {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 404, "{} should be 404 without a ride", uri);
    }
}

#[tokio::test]
async fn test_get_route_summary() {
    let state = riding_state().await;
    let (status, parsed) = get_json(create_router(state), "/api/route").await;

    assert_eq!(status, 200);
    assert_eq!(parsed["name"], "Demo Hills");
    assert_eq!(parsed["is_loop"], true);
    assert_eq!(parsed["has_video"], true);
    assert_eq!(parsed["total_distance"], 3800.0);
}

#[tokio::test]
async fn test_get_ride_after_tick() {
    let state = riding_state().await;
    let (status, parsed) = get_json(create_router(state), "/api/ride").await;

    assert_eq!(status, 200);
    assert_eq!(parsed["adapter"], "demo");
    assert_eq!(parsed["frame"]["source"], "demo");
    let remaining = parsed["remaining"].as_f64().expect("estimate after first tick");
    assert!(remaining > 300.0 && remaining < 900.0, "remaining was {}", remaining);
}

#[tokio::test]
async fn test_get_remaining_at_position() {
    let state = riding_state().await;
    let (status, parsed) =
        get_json(create_router(state), "/api/ride/remaining?position=1900").await;

    assert_eq!(status, 200);
    let now = parsed["remaining"].as_f64().unwrap();
    let halfway = parsed["remaining_at_position"].as_f64().unwrap();
    assert!(halfway > 0.0 && halfway < now);
    assert_eq!(parsed["position"], 1900.0);
}

// ==================== Video endpoints ====================

#[tokio::test]
async fn test_video_playback_without_session_returns_404() {
    let (status, _) = post_json(
        app(),
        "/api/video/playback",
        serde_json::json!({"time": 1.0, "rate": 1.0}),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_video_playback_far_behind_seeks() {
    let state = riding_state().await;

    // rider near the start; video reports from the far side of the loop
    let (status, parsed) = post_json(
        create_router(state.clone()),
        "/api/video/playback",
        serde_json::json!({"time": 200.0, "rate": 1.0}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(parsed["command"]["type"], "seek");

    let (_, video) = get_json(create_router(state), "/api/video/status").await;
    assert_eq!(video["sync"]["loop_mode"], true);
    assert!(video["sync"]["playback"].is_object());
}

#[tokio::test]
async fn test_video_playback_rejects_non_json() {
    let state = riding_state().await;
    let response = create_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/video/playback")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_video_control_actions() {
    let state = riding_state().await;

    let (status, parsed) = post_json(
        create_router(state.clone()),
        "/api/video/control",
        serde_json::json!({"action": "pause"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(parsed["status"], "paused");

    let (_, parsed) = post_json(
        create_router(state.clone()),
        "/api/video/control",
        serde_json::json!({"action": "rate", "value": 10.0}),
    )
    .await;
    assert_eq!(parsed["rate"], 2.5);

    let (_, parsed) = post_json(
        create_router(state.clone()),
        "/api/video/control",
        serde_json::json!({"action": "seek", "value": 42.0}),
    )
    .await;
    assert_eq!(parsed["time"], 42.0);

    let (_, video) = get_json(create_router(state), "/api/video/status").await;
    assert_eq!(video["player"]["playing"], false);
    assert_eq!(video["player"]["time"], 42.0);
}

#[tokio::test]
async fn test_player_uses_configured_rate_bounds() {
    let mut config = ServerConfig::default();
    config.sync.max_playback_rate = 4.0;
    let state = riding_state_with(config).await;

    let (status, parsed) = post_json(
        create_router(state.clone()),
        "/api/video/control",
        serde_json::json!({"action": "rate", "value": 10.0}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(parsed["rate"], 4.0);

    // a synchronizer command at the configured maximum is applied as is
    let command = PlayerCommand::Rate { rate: 4.0 };
    let mut player = state.player.write().await;
    let player = player.as_mut().unwrap();
    player.set_rate(1.0);
    player.apply(&command);
    assert_eq!(player.rate(), 4.0);
}

#[tokio::test]
async fn test_video_control_errors() {
    let state = riding_state().await;

    let (status, _) = post_json(
        create_router(state.clone()),
        "/api/video/control",
        serde_json::json!({"action": "seek"}),
    )
    .await;
    assert_eq!(status, 400, "seek without a value is a bad request");

    let (status, _) = post_json(
        create_router(state),
        "/api/video/control",
        serde_json::json!({"action": "rewind"}),
    )
    .await;
    assert_eq!(status, 400);

    let (status, _) = post_json(
        app(),
        "/api/video/control",
        serde_json::json!({"action": "play"}),
    )
    .await;
    assert_eq!(status, 404, "no player without a ride");
}

// ==================== SSE streams ====================

#[tokio::test]
async fn test_ride_stream_returns_sse_content_type() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/ride/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(
        content_type.contains("text/event-stream"),
        "SSE endpoint should return text/event-stream, got: {}",
        content_type
    );
}

#[tokio::test]
async fn test_command_stream_receives_broadcast_command() {
    let (app, state) = app_with_state();

    // Send a command shortly after the stream connects
    let tx = state.command_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let _ = tx.send(PlayerCommand::Rate { rate: 1.25 });
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/video/commands/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Read the first chunk with a timeout to avoid hanging forever
    let body = response.into_body();
    let result = tokio::time::timeout(std::time::Duration::from_secs(3), async {
        let mut stream = body.into_data_stream();
        use futures::StreamExt;
        if let Some(Ok(chunk)) = stream.next().await {
            return Some(String::from_utf8(chunk.to_vec()).unwrap());
        }
        None
    })
    .await;

    // Timing in CI is unpredictable; the content-type test covers the setup
    if let Ok(Some(text)) = result {
        assert!(text.contains("data:"), "got: {}", text);
        assert!(text.contains("\"rate\""), "got: {}", text);
    }
}

// ==================== AppState unit tests ====================

#[tokio::test]
async fn test_app_state_register_adapter() {
    let state = AppState::default();
    state
        .register_adapter(Box::new(DemoRide::new().unwrap()))
        .await;

    let adapters = state.adapters.read().await;
    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].name(), "Demo Ride");
}

#[tokio::test]
async fn test_ride_tick_broadcasts_frames() {
    let state = AppState::default();
    state
        .register_adapter(Box::new(DemoRide::new().unwrap()))
        .await;
    manager::detection_cycle(&state).await.unwrap();
    let mut rx = state.subscribe();

    manager::ride_tick(&state).await.unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.source, "demo");
}

#[tokio::test]
async fn test_end_session_clears_player() {
    let state = riding_state().await;
    assert!(state.player.read().await.is_some());

    state.end_session().await;
    assert!(state.session.read().await.is_none());
    assert!(state.player.read().await.is_none());
}
