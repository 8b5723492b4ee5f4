//! Remote session HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/hosts/{ip}/sessions              - List sessions on a chat server
//! - POST   /api/v1/hosts/{ip}/sessions              - Create a session
//! - DELETE /api/v1/hosts/{ip}/sessions/{sid}        - Delete a session and forget it locally
//! - POST   /api/v1/hosts/{ip}/sessions/{sid}/share  - Publish a session
//! - GET    /api/v1/hosts/{ip}/sessions/{sid}/state  - Aggregated state

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use tether_types::remote::RemoteSession;
use tether_types::state::AggregatedState;

use crate::http::error::AppError;
use crate::http::extractors::{Host, Target};
use crate::http::response::{ApiResponse, session_path};
use crate::state::AppState;

/// Request body for session creation.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
}

/// Query parameters for the state endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StateQuery {
    /// Poll the chat server before answering.
    #[serde(default)]
    pub refresh: bool,
}

/// GET /api/v1/hosts/{ip}/sessions - List sessions on a chat server.
pub async fn list_sessions(
    State(state): State<AppState>,
    Host(ip): Host,
) -> Result<Json<ApiResponse<Vec<RemoteSession>>>, AppError> {
    let start = Instant::now();

    let endpoint = state.config().remote.endpoint_for(&ip);
    let sessions = state.hub.backend().list_sessions(&endpoint).await?;

    let resp = ApiResponse::success(sessions, start)
        .with_link("self", &format!("/api/v1/hosts/{ip}/sessions"));

    Ok(Json(resp))
}

/// POST /api/v1/hosts/{ip}/sessions - Create a session.
pub async fn create_session(
    State(state): State<AppState>,
    Host(ip): Host,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<ApiResponse<RemoteSession>>, AppError> {
    let start = Instant::now();
    let title = body.and_then(|Json(b)| b.title);

    let endpoint = state.config().remote.endpoint_for(&ip);
    let session = state
        .hub
        .backend()
        .create_session(&endpoint, title.as_deref())
        .await?;

    tracing::info!(%ip, sid = %session.id, "remote session created");

    let base = session_path(&ip, &session.id);
    let resp = ApiResponse::success(session, start)
        .with_link("state", &format!("{base}/state"))
        .with_link("events", &format!("{base}/events"));

    Ok(Json(resp))
}

/// DELETE /api/v1/hosts/{ip}/sessions/{sid} - Delete remotely, then drop local state.
pub async fn delete_session(
    State(state): State<AppState>,
    Target(key): Target,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();

    state
        .hub
        .backend()
        .delete_session(&state.hub.endpoint_for(&key), key.session_id())
        .await?;
    state.hub.forget(&key).await;

    let resp = ApiResponse::success(serde_json::json!({"deleted": true}), start);
    Ok(Json(resp))
}

/// POST /api/v1/hosts/{ip}/sessions/{sid}/share - Publish a session.
pub async fn share_session(
    State(state): State<AppState>,
    Target(key): Target,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();

    let url = state.hub.share(&key).await?;

    let resp = ApiResponse::success(serde_json::json!({"url": url}), start);
    Ok(Json(resp))
}

/// GET /api/v1/hosts/{ip}/sessions/{sid}/state - Aggregated state.
///
/// Sessions nobody has observed yet are polled once on demand.
pub async fn get_state(
    State(state): State<AppState>,
    Target(key): Target,
    Query(query): Query<StateQuery>,
) -> Result<Json<ApiResponse<AggregatedState>>, AppError> {
    let start = Instant::now();

    let aggregated = match state.hub.snapshot(&key) {
        Some(existing) if !query.refresh => existing,
        _ => state.hub.poll_once(key.clone()).await.state,
    };

    let base = session_path(key.ip(), key.session_id());
    let resp = ApiResponse::success(aggregated, start)
        .with_link("self", &format!("{base}/state"))
        .with_link("events", &format!("{base}/events"))
        .with_link("jobs", &format!("{base}/jobs"));

    Ok(Json(resp))
}
