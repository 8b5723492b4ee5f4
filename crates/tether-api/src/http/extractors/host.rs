//! Allow-list extractors for `{ip}`-scoped routes.
//!
//! Every route under `/api/v1/hosts/{ip}` extracts either [`Host`] or
//! [`Target`]. Both reject the request with `IP_NOT_ALLOWED` before any
//! handler code touches the hub when the ip is not in `server.allowed_ips`.

use std::collections::HashMap;
use std::net::IpAddr;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use tether_types::session::SessionKey;

use crate::http::error::AppError;
use crate::state::AppState;

/// A chat server ip that passed the allow-list.
#[derive(Debug, Clone)]
pub struct Host(pub String);

/// A session on an allowed chat server.
#[derive(Debug, Clone)]
pub struct Target(pub SessionKey);

async fn path_params(
    parts: &mut Parts,
    state: &AppState,
) -> Result<HashMap<String, String>, AppError> {
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(params)
}

fn check_ip(state: &AppState, raw: &str) -> Result<String, AppError> {
    let ip: IpAddr = raw
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid IP address: {raw}")))?;
    let ip = ip.to_string();

    if !state.config().server.is_allowed(&ip) {
        tracing::debug!(%ip, "host rejected by allow-list");
        return Err(AppError::IpNotAllowed(ip));
    }
    Ok(ip)
}

impl FromRequestParts<AppState> for Host {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        let raw = params
            .get("ip")
            .ok_or_else(|| AppError::Validation("Missing host ip".to_string()))?;
        Ok(Host(check_ip(state, raw)?))
    }
}

impl FromRequestParts<AppState> for Target {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        let raw = params
            .get("ip")
            .ok_or_else(|| AppError::Validation("Missing host ip".to_string()))?;
        let ip = check_ip(state, raw)?;

        let sid = params
            .get("sid")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("Missing session id".to_string()))?;

        Ok(Target(SessionKey::new(ip, sid)))
    }
}
