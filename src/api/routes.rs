//! API route definitions and handlers.

use super::state::AppState;
use crate::analysis::Severity;
use crate::notify::Event;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{error, warn};
use uuid::Uuid;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/samples", get(list_samples))
        .route("/samples/latest", get(latest_sample))
        .route("/anomalies", get(list_anomalies))
        .route("/anomalies/{id}/acknowledge", patch(acknowledge_anomaly))
        .route("/statistics", get(statistics))
        .route("/statistics/history", get(statistics_history))
        .route("/predictions", get(predictions))
        .route("/predictions/sma", get(predictions_sma))
        .route("/confidence-bands", get(confidence_bands))
        .route("/ws", get(ws_upgrade))
}

enum ApiError {
    NotFound(&'static str),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": what }))).into_response()
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Internal(e) => {
                error!("API error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct AnomalyQuery {
    limit: Option<usize>,
    severity: Option<String>,
}

#[derive(Deserialize)]
struct WindowQuery {
    window_hours: Option<i64>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    window_hours: Option<i64>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct SmaQuery {
    window_hours: Option<i64>,
    period: Option<usize>,
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
        }
    }))
}

async fn list_samples(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> ApiResult {
    let limit = q.limit.unwrap_or(20);
    let samples = state.store.recent_samples(limit)?;
    let count = samples.len();
    Ok(Json(json!({
        "data": samples,
        "meta": { "count": count, "limit": limit }
    })))
}

async fn latest_sample(State(state): State<AppState>) -> ApiResult {
    let sample = state.store.latest_sample()?;
    Ok(Json(json!({ "data": sample })))
}

async fn list_anomalies(State(state): State<AppState>, Query(q): Query<AnomalyQuery>) -> ApiResult {
    let limit = q.limit.unwrap_or(50);
    let severity = match q.severity.as_deref() {
        None => None,
        Some(raw) => Some(
            Severity::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown severity '{raw}'")))?,
        ),
    };

    let anomalies = state.store.list_anomalies(limit, severity)?;
    let count = anomalies.len();
    Ok(Json(json!({
        "data": anomalies,
        "meta": {
            "count": count,
            "severity": q.severity.unwrap_or_else(|| "all".to_string()),
        }
    })))
}

async fn acknowledge_anomaly(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    match state.store.acknowledge_anomaly(id)? {
        Some(anomaly) => Ok(Json(json!({ "data": anomaly }))),
        None => Err(ApiError::NotFound("anomaly not found")),
    }
}

async fn statistics(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> ApiResult {
    let hours = q.window_hours.unwrap_or(state.default_window_hours);
    let snapshot = state.stats.snapshot(hours, Utc::now())?;
    Ok(Json(json!({ "data": snapshot })))
}

async fn statistics_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult {
    let hours = q.window_hours.unwrap_or(state.default_window_hours);
    let limit = q.limit.unwrap_or(100);
    let history = state.store.statistics_history(hours, limit)?;
    let count = history.len();
    Ok(Json(json!({
        "data": history,
        "meta": { "count": count, "windowHours": hours }
    })))
}

async fn predictions(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> ApiResult {
    let hours = q.window_hours.unwrap_or(state.default_window_hours);
    let prediction = state.forecast.predict_next(hours).await?;
    Ok(Json(json!({ "data": prediction })))
}

async fn predictions_sma(State(state): State<AppState>, Query(q): Query<SmaQuery>) -> ApiResult {
    let hours = q.window_hours.unwrap_or(state.default_window_hours);
    let period = q.period.unwrap_or(10);
    let prediction = state.forecast.predict_sma(hours, period)?;
    Ok(Json(json!({ "data": prediction })))
}

async fn confidence_bands(
    State(state): State<AppState>,
    Query(q): Query<WindowQuery>,
) -> ApiResult {
    let hours = q.window_hours.unwrap_or(state.default_window_hours);
    let snapshot = state.stats.snapshot(hours, Utc::now())?;
    Ok(Json(json!({
        "data": {
            "mean": snapshot.mean,
            "lower": snapshot.confidence_lower,
            "upper": snapshot.confidence_upper,
            "confidenceLevel": snapshot.confidence_level,
            "stdDev": snapshot.std_dev,
        }
    })))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let rx = state.notifier.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

async fn stream_events(mut socket: WebSocket, mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "WebSocket subscriber lagging, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
