//! API route handlers for the gateway.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use visadesk_core::deadline::Deadline;
use visadesk_core::error::VisaDeskError;
use visadesk_scheduler::ScheduleOutcome;

use super::server::AppState;
use super::service::{DeadlinePatch, NewClient, NewDeadline};

type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn ok(body: serde_json::Value) -> ApiResponse {
    (StatusCode::OK, Json(body))
}

/// Map a store/service error to the `{"ok": false}` envelope.
fn error_response(e: VisaDeskError) -> ApiResponse {
    let status = match &e {
        VisaDeskError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("❌ Request failed: {e}");
    }
    (status, Json(serde_json::json!({"ok": false, "error": e.to_string()})))
}

fn parse_body<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
) -> Result<T, VisaDeskError> {
    serde_json::from_value(body)
        .map_err(|e| VisaDeskError::Validation(format!("Invalid request body: {e}")))
}

fn reminder_json(outcome: &ScheduleOutcome) -> serde_json::Value {
    match outcome {
        ScheduleOutcome::Scheduled { fire_at } | ScheduleOutcome::InPast { fire_at } => {
            serde_json::json!({"status": outcome.as_str(), "fire_at": fire_at.to_rfc3339()})
        }
        ScheduleOutcome::Failed(reason) => {
            serde_json::json!({"status": outcome.as_str(), "reason": reason})
        }
        _ => serde_json::json!({"status": outcome.as_str()}),
    }
}

fn deadline_json(state: &AppState, d: &Deadline) -> serde_json::Value {
    let mut value = serde_json::to_value(d).unwrap_or_default();
    value["next_reminder"] = serde_json::json!(
        state
            .service
            .scheduler()
            .next_fire(&d.id)
            .map(|t| t.to_rfc3339())
    );
    value
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "visadesk-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "organization": state.config.organization.name,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "timezone": state.service.scheduler().timezone().name(),
        "scheduled_reminders": state.service.scheduler().job_count(),
    }))
}

// ---- Clients ----

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResponse {
    let result = parse_body::<NewClient>(body).and_then(|input| state.service.create_client(input));
    match result {
        Ok(client) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"ok": true, "client": client})),
        ),
        Err(e) => error_response(e),
    }
}

pub async fn list_clients(State(state): State<Arc<AppState>>) -> ApiResponse {
    match state.service.db().list_clients() {
        Ok(clients) => ok(serde_json::json!({
            "ok": true,
            "count": clients.len(),
            "clients": clients,
        })),
        Err(e) => error_response(e),
    }
}

pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.service.db().get_client(&id) {
        Ok(client) => ok(serde_json::json!({"ok": true, "client": client})),
        Err(e) => error_response(e),
    }
}

// ---- Deadlines ----

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Include archived deadlines.
    #[serde(default)]
    pub history: bool,
}

pub async fn create_deadline(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResponse {
    let result = parse_body::<NewDeadline>(body).and_then(|input| state.service.create(input));
    match result {
        Ok((deadline, outcome)) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "ok": true,
                "deadline": deadline,
                "reminder": reminder_json(&outcome),
            })),
        ),
        Err(e) => error_response(e),
    }
}

pub async fn list_deadlines(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    match state.service.list(query.history) {
        Ok(deadlines) => {
            let items: Vec<_> = deadlines.iter().map(|d| deadline_json(&state, d)).collect();
            ok(serde_json::json!({"ok": true, "count": items.len(), "deadlines": items}))
        }
        Err(e) => error_response(e),
    }
}

pub async fn get_deadline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.service.get(&id) {
        Ok(deadline) => ok(serde_json::json!({
            "ok": true,
            "deadline": deadline_json(&state, &deadline),
        })),
        Err(e) => error_response(e),
    }
}

pub async fn update_deadline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResponse {
    let result =
        parse_body::<DeadlinePatch>(body).and_then(|patch| state.service.update(&id, patch));
    match result {
        Ok((deadline, outcome)) => ok(serde_json::json!({
            "ok": true,
            "deadline": deadline,
            "reminder": reminder_json(&outcome),
        })),
        Err(e) => error_response(e),
    }
}

pub async fn delete_deadline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.service.delete(&id) {
        Ok(()) => ok(serde_json::json!({"ok": true, "id": id})),
        Err(e) => error_response(e),
    }
}

pub async fn archive_deadline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.service.archive(&id) {
        Ok(deadline) => ok(serde_json::json!({"ok": true, "deadline": deadline})),
        Err(e) => error_response(e),
    }
}

pub async fn restore_deadline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.service.restore(&id) {
        Ok((deadline, outcome)) => ok(serde_json::json!({
            "ok": true,
            "deadline": deadline,
            "reminder": reminder_json(&outcome),
        })),
        Err(e) => error_response(e),
    }
}

// ---- Reminders ----

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Live reminder jobs, soonest first.
pub async fn list_reminders(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let scheduler = state.service.scheduler();
    let tz = scheduler.timezone();
    let jobs: Vec<_> = scheduler
        .jobs()
        .into_iter()
        .map(|job| {
            serde_json::json!({
                "deadline_id": job.deadline_id,
                "client_name": job.client_name,
                "type": job.deadline_type,
                "fire_at": job.fire_at.to_rfc3339(),
                "fire_at_local": job.fire_at.with_timezone(&tz).to_rfc3339(),
            })
        })
        .collect();
    Json(serde_json::json!({"ok": true, "count": jobs.len(), "reminders": jobs}))
}

/// Fire a pending reminder right away.
pub async fn fire_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    if state.service.scheduler().fire_now(&id).await {
        ok(serde_json::json!({"ok": true, "id": id}))
    } else {
        error_response(VisaDeskError::NotFound(format!("no pending reminder for {id}")))
    }
}

/// Recently fired reminders, most recent first.
pub async fn reminder_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let history = state.reminder_log.recent(query.limit.unwrap_or(50));
    Json(serde_json::json!({"ok": true, "count": history.len(), "history": history}))
}
