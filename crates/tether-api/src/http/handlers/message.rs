//! Outbound message handlers for the REST API.
//!
//! Messages are not delivered inline: they join the global FIFO and the
//! queue worker started by `serve` delivers them.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use tether_types::queue::QueuedMessageJob;

use crate::http::error::AppError;
use crate::http::extractors::Target;
use crate::http::response::{ApiResponse, session_path};
use crate::state::AppState;

/// Request body for sending a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// POST /api/v1/hosts/{ip}/sessions/{sid}/messages - Enqueue a message.
pub async fn send_message(
    State(state): State<AppState>,
    Target(key): Target,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let start = Instant::now();

    if body.text.trim().is_empty() {
        return Err(AppError::Validation("Message text must not be empty".to_string()));
    }

    let queue_len = state.hub.enqueue(&key, &body.text);

    let resp = ApiResponse::success(serde_json::json!({"queued": queue_len}), start)
        .with_link(
            "jobs",
            &format!("{}/jobs", session_path(key.ip(), key.session_id())),
        );

    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// POST /api/v1/hosts/{ip}/sessions/{sid}/retry - Re-send the newest failed message.
pub async fn retry_last_failed(
    State(state): State<AppState>,
    Target(key): Target,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let start = Instant::now();

    let job_id = state.hub.retry_last_failed(&key)?;

    let resp = ApiResponse::success(serde_json::json!({"job_id": job_id}), start);
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// GET /api/v1/hosts/{ip}/sessions/{sid}/jobs - Queue history, oldest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Target(key): Target,
) -> Result<Json<ApiResponse<Vec<QueuedMessageJob>>>, AppError> {
    let start = Instant::now();

    let jobs = state.hub.queue().history(&key);

    let resp = ApiResponse::success(jobs, start).with_link(
        "self",
        &format!("{}/jobs", session_path(key.ip(), key.session_id())),
    );
    Ok(Json(resp))
}
