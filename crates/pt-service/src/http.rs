//! JSON HTTP API.
//!
//! The caller is identified by the `x-user-id` header.

use std::future::Future;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pt_core::{DailySummary, TaskId, TaskStatus, Timer, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

use crate::error::TrackerError;
use crate::tracker::{ActiveTimer, Tracker};

/// Header carrying the caller's user ID.
pub const USER_HEADER: &str = "x-user-id";

/// An error rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        let status = match &err {
            TrackerError::Conflict(_) => StatusCode::CONFLICT,
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::Validation(_) => StatusCode::BAD_REQUEST,
            TrackerError::Storage(_) | TrackerError::Join(_) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// The authenticated caller.
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError::new(StatusCode::UNAUTHORIZED, format!("missing {USER_HEADER} header"))
            })?;
        UserId::new(value)
            .map(Self)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StartTimerRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    pub last_sync: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub timers: Vec<Timer>,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TaskStatusRequest {
    pub status: TaskStatus,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: TaskId,
    pub previous: Option<TaskStatus>,
    pub status: TaskStatus,
    pub completed: bool,
}

/// Builds the API router.
pub fn router(tracker: Tracker) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/summary/today", get(today_summary))
        .route("/v1/timer/active", get(active_timer))
        .route("/v1/timer/start", post(start_timer))
        .route("/v1/timer/pause", post(pause_timer))
        .route("/v1/timer/resume", post(resume_timer))
        .route("/v1/timer/stop", post(stop_timer))
        .route("/v1/sync", get(sync))
        .route("/v1/tasks/{task_id}/status", post(save_task_status))
        .with_state(tracker)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    tracker: Tracker,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP API listening");
    }
    axum::serve(listener, router(tracker))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn today_summary(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
) -> Result<impl IntoResponse, ApiError> {
    let summary: DailySummary = tracker.today_summary(&user).await?;
    Ok(([(CACHE_CONTROL, "no-store")], Json(summary)))
}

async fn active_timer(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
) -> Result<impl IntoResponse, ApiError> {
    let active: Option<ActiveTimer> = tracker.active_timer(&user).await?;
    Ok(([(CACHE_CONTROL, "no-store")], Json(active)))
}

async fn start_timer(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
    body: Option<Json<StartTimerRequest>>,
) -> Result<Json<Timer>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let timer = tracker
        .start(&user, request.description, request.tags)
        .await?;
    Ok(Json(timer))
}

async fn pause_timer(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
) -> Result<Json<Timer>, ApiError> {
    Ok(Json(tracker.pause(&user).await?))
}

async fn resume_timer(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
) -> Result<Json<Timer>, ApiError> {
    Ok(Json(tracker.resume(&user).await?))
}

async fn stop_timer(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
) -> Result<Json<Timer>, ApiError> {
    Ok(Json(tracker.stop(&user).await?))
}

async fn sync(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncResponse>, ApiError> {
    let server_time = Utc::now();
    let timers = tracker.sync(&user, query.last_sync).await?;
    Ok(Json(SyncResponse {
        timers,
        server_time,
    }))
}

async fn save_task_status(
    State(tracker): State<Tracker>,
    Caller(user): Caller,
    Path(task_id): Path<String>,
    Json(request): Json<TaskStatusRequest>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task = TaskId::new(task_id).map_err(TrackerError::from)?;
    let change = tracker
        .save_task(&user, &task, request.title, request.status)
        .await?;
    Ok(Json(TaskStatusResponse {
        completed: change.completes_task(),
        task_id: change.task,
        previous: change.previous,
        status: change.new,
    }))
}
