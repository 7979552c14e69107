//! Scheduler settings CRUD, status, manual trigger/cancel, run history, and
//! the SSE progress stream — the thin HTTP shell over `sa_scheduler::SchedulerCore`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use sa_domain::model::{SchedulerSettings, SearchCriteria, Weekday};
use serde::Deserialize;

use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn user_id() -> &'static str {
    SchedulerSettings::DEFAULT_USER_ID
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /scheduler/settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.scheduler.get_user_settings(user_id()).await;
    Json(serde_json::json!({
        "settings": view.settings,
        "next_run_at": view.next_run_at,
        "is_running": view.is_running,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /scheduler/settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub enabled: Option<bool>,
    pub schedule_hour: Option<u32>,
    pub schedule_minute: Option<u32>,
    pub schedule_days: Option<Vec<Weekday>>,
    pub timezone: Option<String>,
    pub max_applications_per_run: Option<u32>,
    pub resume_id: Option<Option<String>>,
    pub search_criteria: Option<SearchCriteria>,
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    let mut settings = state.settings.get_or_default(user_id()).await;

    if let Some(v) = req.enabled {
        settings.enabled = v;
    }
    if let Some(v) = req.schedule_hour {
        if v > 23 {
            return api_error(StatusCode::BAD_REQUEST, "schedule_hour must be 0-23");
        }
        settings.schedule_hour = v;
    }
    if let Some(v) = req.schedule_minute {
        if v > 59 {
            return api_error(StatusCode::BAD_REQUEST, "schedule_minute must be 0-59");
        }
        settings.schedule_minute = v;
    }
    if let Some(v) = req.schedule_days {
        settings.schedule_days = v;
    }
    if let Some(v) = req.timezone {
        if v.parse::<chrono_tz::Tz>().is_err() {
            return api_error(StatusCode::BAD_REQUEST, format!("unrecognized timezone {v:?}"));
        }
        settings.timezone = v;
    }
    if let Some(v) = req.max_applications_per_run {
        settings.max_applications_per_run = v;
    }
    if let Some(v) = req.resume_id {
        settings.resume_id = v;
    }
    if let Some(v) = req.search_criteria {
        settings.search_criteria = Some(v);
    }

    match state.scheduler.update_user_settings(settings).await {
        Ok(saved) => Json(serde_json::json!({ "settings": saved })).into_response(),
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /scheduler/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let s = state.scheduler.get_status().await;
    Json(serde_json::json!({
        "up": s.up,
        "total_triggers": s.total_triggers,
        "earliest_next_run_at": s.earliest_next_run_at,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /scheduler/run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize, Default)]
pub struct RunNowRequest {
    pub max_applications: Option<u32>,
}

pub async fn run_now(
    State(state): State<AppState>,
    body: Option<Json<RunNowRequest>>,
) -> impl IntoResponse {
    let max_override = body.map(|Json(b)| b.max_applications).unwrap_or(None);
    match state
        .scheduler
        .trigger_manual_run(user_id(), max_override)
        .await
    {
        Ok(run_id) => Json(serde_json::json!({ "run_id": run_id })).into_response(),
        Err(e) => api_error(StatusCode::CONFLICT, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /scheduler/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    let cancelled = state.scheduler.cancel_running_job(user_id()).await;
    Json(serde_json::json!({ "cancel_requested": cancelled }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /scheduler/history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    let rows = state.scheduler.get_run_history(user_id(), q.limit).await;
    Json(serde_json::json!({ "runs": rows, "count": rows.len() }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /scheduler/run/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<uuid::Uuid>,
) -> impl IntoResponse {
    match state.runs.get(&run_id).await {
        Some(row) => Json(serde_json::json!({ "run": row })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "run not found"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /apply/bulk/stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stream of `ProgressEvent`s for every run, regardless of user — the
/// process is single-tenant (see spec Non-goals), so there is exactly one
/// stream of interest.
pub async fn apply_bulk_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let mut rx = state.runs.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event("progress").data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("warning")
                        .data(format!("{{\"missed\":{n}}}")));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
