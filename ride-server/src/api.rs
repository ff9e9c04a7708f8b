//! REST API and SSE routes

use crate::player::{start_player_task, PlayerInfo};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use ride_core::model::RouteSummary;
use ride_core::RideFrame;
use ride_engine::{PlayerCommand, SyncStatus};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

type ApiError = (StatusCode, String);

fn no_session() -> ApiError {
    (StatusCode::NOT_FOUND, "No active ride".to_string())
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/adapters", get(list_adapters))
        .route("/api/route", get(route_summary))
        .route("/api/ride", get(ride_status))
        .route("/api/ride/remaining", get(ride_remaining))
        .route("/api/ride/stream", get(ride_stream))
        .route("/api/video/playback", post(video_playback))
        .route("/api/video/status", get(video_status))
        .route("/api/video/control", post(video_control))
        .route("/api/video/commands/stream", get(command_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Adapter Endpoints ===

#[derive(Serialize)]
struct AdapterInfo {
    key: String,
    name: String,
    detected: bool,
    active: bool,
}

async fn list_adapters(State(state): State<AppState>) -> Json<Vec<AdapterInfo>> {
    let adapters = state.adapters.read().await;
    let active_key = state.active_adapter.read().await;

    let info: Vec<AdapterInfo> = adapters
        .iter()
        .map(|adapter| AdapterInfo {
            key: adapter.key().to_string(),
            name: adapter.name().to_string(),
            detected: adapter.detect(),
            active: adapter.is_active()
                || active_key
                    .as_ref()
                    .map(|k| k == adapter.key())
                    .unwrap_or(false),
        })
        .collect();

    Json(info)
}

// === Ride Endpoints ===

async fn route_summary(State(state): State<AppState>) -> Result<Json<RouteSummary>, ApiError> {
    let session = state.session.read().await;
    let session = session.as_ref().ok_or_else(no_session)?;
    Ok(Json(session.route.summary()))
}

#[derive(Serialize)]
struct RideStatus {
    adapter: String,
    frame: Option<RideFrame>,
    remaining: Option<f64>,
}

async fn ride_status(State(state): State<AppState>) -> Result<Json<RideStatus>, ApiError> {
    let session = state.session.read().await;
    let session = session.as_ref().ok_or_else(no_session)?;
    Ok(Json(RideStatus {
        adapter: session.adapter.clone(),
        frame: session.last_frame.clone(),
        remaining: session.remaining,
    }))
}

#[derive(Deserialize)]
struct RemainingQuery {
    /// Route distance to read the projected remaining time at
    position: Option<f64>,
}

#[derive(Serialize)]
struct RemainingResponse {
    remaining: Option<f64>,
    position: Option<f64>,
    remaining_at_position: Option<f64>,
    computed_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn ride_remaining(
    State(state): State<AppState>,
    Query(query): Query<RemainingQuery>,
) -> Result<Json<RemainingResponse>, ApiError> {
    let session = state.session.read().await;
    let session = session.as_ref().ok_or_else(no_session)?;
    Ok(Json(RemainingResponse {
        remaining: session.remaining,
        position: query.position,
        remaining_at_position: query
            .position
            .and_then(|p| session.estimator.remaining_at(p)),
        computed_at: session.estimator.cache().map(|c| c.computed_at),
    }))
}

async fn ride_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    Sse::new(json_events(BroadcastStream::new(rx))).keep_alive(KeepAlive::default())
}

// === Video Endpoints ===

#[derive(Deserialize)]
struct PlaybackReport {
    time: f64,
    #[serde(default = "unit_rate")]
    rate: f64,
}

fn unit_rate() -> f64 {
    1.0
}

#[derive(Serialize)]
struct PlaybackResponse {
    command: Option<PlayerCommand>,
}

/// An external player reports its play head
async fn video_playback(
    State(state): State<AppState>,
    Json(report): Json<PlaybackReport>,
) -> Result<Json<PlaybackResponse>, ApiError> {
    if !report.time.is_finite() || !report.rate.is_finite() {
        return Err((StatusCode::BAD_REQUEST, "time and rate must be finite".to_string()));
    }
    let mut session = state.session.write().await;
    let session = session.as_mut().ok_or_else(no_session)?;
    let command = session
        .synchronizer
        .on_video_playback_update(report.time, report.rate);
    Ok(Json(PlaybackResponse { command }))
}

#[derive(Serialize)]
struct VideoStatus {
    sync: SyncStatus,
    player: Option<PlayerInfo>,
}

async fn video_status(State(state): State<AppState>) -> Result<Json<VideoStatus>, ApiError> {
    let sync = {
        let session = state.session.read().await;
        session.as_ref().ok_or_else(no_session)?.synchronizer.status()
    };
    let player = state.player.read().await.as_ref().map(|p| p.info());
    Ok(Json(VideoStatus { sync, player }))
}

#[derive(Deserialize)]
struct VideoControlRequest {
    action: String,
    value: Option<f64>,
}

async fn video_control(
    State(state): State<AppState>,
    Json(request): Json<VideoControlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut player = state.player.write().await;
    let player_state = player
        .as_mut()
        .ok_or((StatusCode::NOT_FOUND, "No video player".to_string()))?;

    match request.action.as_str() {
        "play" => {
            player_state.play();
            drop(player);
            start_player_task(state.clone()).await;
            Ok(Json(serde_json::json!({"status": "playing"})))
        }
        "pause" => {
            player_state.pause();
            Ok(Json(serde_json::json!({"status": "paused"})))
        }
        "seek" => {
            let time = request
                .value
                .ok_or((StatusCode::BAD_REQUEST, "Missing 'value' for seek".to_string()))?;
            player_state.seek(time);
            Ok(Json(serde_json::json!({"status": "seeked", "time": player_state.time()})))
        }
        "rate" => {
            let rate = request
                .value
                .ok_or((StatusCode::BAD_REQUEST, "Missing 'value' for rate".to_string()))?;
            player_state.set_rate(rate);
            Ok(Json(serde_json::json!({"status": "rate_set", "rate": player_state.rate()})))
        }
        _ => Err((
            StatusCode::BAD_REQUEST,
            format!("Unknown action: {}", request.action),
        )),
    }
}

async fn command_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe_commands();
    Sse::new(json_events(BroadcastStream::new(rx))).keep_alive(KeepAlive::default())
}

/// Serialize every broadcast item as one SSE event, skipping lagged gaps
fn json_events<T>(
    stream: BroadcastStream<T>,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Serialize + Clone + Send + 'static,
{
    stream.filter_map(|result| async move {
        match result {
            Ok(item) => match Event::default().json_data(&item) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Broadcast stream error: {}", e);
                None
            }
        }
    })
}
