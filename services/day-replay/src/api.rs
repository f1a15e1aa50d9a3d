//! JSON API over the replay engine

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::engine::Engine;
use crate::error::ReplayError;
use crate::interval::Interval;
use crate::time_math::format_hhmm;
use crate::timeline::DEFAULT_NEAR_TOLERANCE_SECONDS;

/// API application state
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
}

/// Build the API axum router
pub fn build_router(engine: Arc<Engine>) -> Router {
    let api_state = ApiState { engine };

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/timeline", get(timeline_handler))
        .route("/api/active", get(active_handler))
        .route("/api/sensors", get(sensors_handler))
        .route("/api/clock", get(clock_handler))
        .route("/api/clock/play", post(play_handler))
        .route("/api/clock/pause", post(pause_handler))
        .route("/api/clock/seek", post(seek_handler))
        .route("/api/clock/speed", post(speed_handler))
        .route("/api/day", post(day_handler))
        .route("/api/days/{date}/has-data", get(has_data_handler))
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

impl IntoResponse for ReplayError {
    fn into_response(self) -> Response {
        let status = match &self {
            ReplayError::NoDaySelected => StatusCode::CONFLICT,
            ReplayError::InvalidSpeed(_) | ReplayError::InvalidDate(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct AtQuery {
    /// Seconds of day; defaults to the clock position
    at: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SeekRequest {
    seconds: u32,
}

#[derive(Debug, Deserialize)]
struct SpeedRequest {
    multiplier: f64,
}

#[derive(Debug, Deserialize)]
struct DayRequest {
    date: Option<NaiveDate>,
    shift: Option<i64>,
    #[serde(default)]
    today: bool,
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn timeline_handler(State(api): State<ApiState>) -> Response {
    let now = api.engine.now_seconds();
    let handle = api.engine.state();
    let state = handle.read().await;
    let Some(timeline) = state.timeline.as_ref() else {
        return ReplayError::NoDaySelected.into_response();
    };

    Json(serde_json::json!({
        "view": timeline.view(now),
        "generation": state.generation,
        "requested_date": state.requested_date,
        "loading": state.is_loading(),
        "live_mode": state.live_mode,
        "live_now_seconds": state.live_now_seconds,
        "ongoing_durations": state.ongoing_durations,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
    .into_response()
}

async fn active_handler(State(api): State<ApiState>, Query(query): Query<AtQuery>) -> Response {
    let now = api.engine.now_seconds();
    let handle = api.engine.state();
    let state = handle.read().await;
    let Some(timeline) = state.timeline.as_ref() else {
        return ReplayError::NoDaySelected.into_response();
    };

    let at = query.at.unwrap_or_else(|| timeline.clock().current_seconds());
    let near: HashMap<&str, Vec<&Interval>> = timeline
        .entities()
        .map(|entity| {
            let id = entity.entity_id.as_str();
            (
                id,
                timeline.intervals_near(id, at, DEFAULT_NEAR_TOLERANCE_SECONDS, now),
            )
        })
        .filter(|(_, intervals)| !intervals.is_empty())
        .collect();

    Json(serde_json::json!({
        "at": at,
        "time": format_hhmm(at),
        "active": timeline.active_at(at),
        "near": near,
    }))
    .into_response()
}

async fn sensors_handler(State(api): State<ApiState>, Query(query): Query<AtQuery>) -> Response {
    let handle = api.engine.state();
    let state = handle.read().await;
    let Some(timeline) = state.timeline.as_ref() else {
        return ReplayError::NoDaySelected.into_response();
    };

    let at = query.at.unwrap_or_else(|| timeline.clock().current_seconds());
    Json(serde_json::json!({
        "at": at,
        "time": format_hhmm(at),
        "readings": timeline.sensor_values_at(at),
    }))
    .into_response()
}

async fn clock_handler(State(api): State<ApiState>) -> Response {
    match api.engine.clock_snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn play_handler(State(api): State<ApiState>) -> Response {
    match api.engine.play().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn pause_handler(State(api): State<ApiState>) -> Response {
    match api.engine.pause().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn seek_handler(State(api): State<ApiState>, Json(request): Json<SeekRequest>) -> Response {
    match api.engine.seek(request.seconds).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn speed_handler(State(api): State<ApiState>, Json(request): Json<SpeedRequest>) -> Response {
    match api.engine.set_speed(request.multiplier).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn day_handler(State(api): State<ApiState>, Json(request): Json<DayRequest>) -> Response {
    let engine = &api.engine;
    let (date, installed) = match request {
        DayRequest {
            date: Some(date), ..
        } => (date, engine.select_day(date).await),
        DayRequest {
            shift: Some(days), ..
        } => match engine.shift_day(days).await {
            Ok(shifted) => shifted,
            Err(e) => return e.into_response(),
        },
        DayRequest { today: true, .. } => (engine.today(), engine.select_today().await),
        _ => {
            return ReplayError::InvalidDate("expected one of date, shift or today".to_string())
                .into_response()
        }
    };

    let handle = engine.state();
    let state = handle.read().await;
    Json(serde_json::json!({
        "date": date,
        "installed": installed,
        "generation": state.generation,
    }))
    .into_response()
}

async fn has_data_handler(State(api): State<ApiState>, Path(date): Path<String>) -> Response {
    let date = match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => return ReplayError::InvalidDate(date).into_response(),
    };
    let has_data = api.engine.day_has_data(date).await;
    Json(serde_json::json!({ "date": date, "has_data": has_data })).into_response()
}
