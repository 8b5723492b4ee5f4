//! Axum router configuration with middleware.
//!
//! All session routes are under `/api/v1/hosts/{ip}/` and pass the IP
//! allow-list before reaching a handler.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Remote sessions
        .route(
            "/hosts/{ip}/sessions",
            get(handlers::session::list_sessions).post(handlers::session::create_session),
        )
        .route(
            "/hosts/{ip}/sessions/{sid}",
            delete(handlers::session::delete_session),
        )
        .route(
            "/hosts/{ip}/sessions/{sid}/share",
            post(handlers::session::share_session),
        )
        .route(
            "/hosts/{ip}/sessions/{sid}/state",
            get(handlers::session::get_state),
        )
        // Live snapshots
        .route(
            "/hosts/{ip}/sessions/{sid}/events",
            get(handlers::stream::stream_events),
        )
        // Outbound queue
        .route(
            "/hosts/{ip}/sessions/{sid}/messages",
            post(handlers::message::send_message),
        )
        .route(
            "/hosts/{ip}/sessions/{sid}/retry",
            post(handlers::message::retry_last_failed),
        )
        .route(
            "/hosts/{ip}/sessions/{sid}/jobs",
            get(handlers::message::list_jobs),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no allow-list).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use serde_json::Value;
    use tether_core::remote::{BoxChatBackend, ChatBackend};
    use tether_core::session::SessionHub;
    use tether_infra::crypto::hash::Sha256ContentHasher;
    use tether_types::config::TetherConfig;
    use tether_types::error::RemoteError;
    use tether_types::message::{RecentMessage, RemoteMessage};
    use tether_types::remote::{RemoteSession, SendOutcome, SummarizeOutcome};

    struct StubBackend;

    fn stub_session(id: &str) -> RemoteSession {
        RemoteSession {
            id: id.to_string(),
            title: Some("Refactor".to_string()),
            created_at: Some(1_700_000_000_000),
            share_url: None,
        }
    }

    impl ChatBackend for StubBackend {
        async fn list_messages(
            &self,
            _endpoint: &str,
            _session_id: &str,
        ) -> Result<Vec<RemoteMessage>, RemoteError> {
            Ok(vec![
                RemoteMessage::new("user", "run the tests"),
                RemoteMessage::new("assistant", "all green"),
            ])
        }

        async fn send_message(
            &self,
            _endpoint: &str,
            _session_id: &str,
            _text: &str,
        ) -> Result<SendOutcome, RemoteError> {
            Ok(SendOutcome::sent(vec!["ack".to_string()]))
        }

        async fn summarize(
            &self,
            _endpoint: &str,
            _window: &[RecentMessage],
            _session_id: &str,
            _instruction: &str,
        ) -> Result<SummarizeOutcome, RemoteError> {
            Ok(SummarizeOutcome::summarized("Tests pass", false))
        }

        async fn create_session(
            &self,
            _endpoint: &str,
            _title: Option<&str>,
        ) -> Result<RemoteSession, RemoteError> {
            Ok(stub_session("ses_new"))
        }

        async fn list_sessions(&self, _endpoint: &str) -> Result<Vec<RemoteSession>, RemoteError> {
            Ok(vec![stub_session("ses_1"), stub_session("ses_2")])
        }

        async fn delete_session(&self, _endpoint: &str, _session_id: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn share_session(&self, _endpoint: &str, session_id: &str) -> Result<String, RemoteError> {
            Ok(format!("https://share.test/{session_id}"))
        }
    }

    async fn serve() -> String {
        let mut config = TetherConfig::default();
        config.server.allowed_ips = vec!["10.0.0.1".to_string()];
        let hub = SessionHub::new(
            config,
            BoxChatBackend::new(StubBackend),
            Arc::new(Sha256ContentHasher::new()),
            None,
        );
        let app = build_router(AppState::from_hub(hub, PathBuf::from(".")));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health() {
        let base = serve().await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_disallowed_ip_is_rejected() {
        let base = serve().await;
        let resp = reqwest::get(format!("{base}/api/v1/hosts/10.0.0.2/sessions"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["errors"][0]["code"], "IP_NOT_ALLOWED");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_ip_is_bad_request() {
        let base = serve().await;
        let resp = reqwest::get(format!("{base}/api/v1/hosts/not-an-ip/sessions"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_list_sessions_envelope() {
        let base = serve().await;
        let body: Value = reqwest::get(format!("{base}/api/v1/hosts/10.0.0.1/sessions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["id"], "ses_1");
        assert_eq!(body["errors"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_enqueue_then_list_jobs() {
        let base = serve().await;
        let client = reqwest::Client::new();
        let session = format!("{base}/api/v1/hosts/10.0.0.1/sessions/ses_1");

        let resp = client
            .post(format!("{session}/messages"))
            .json(&serde_json::json!({"text": "deploy it"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);

        let body: Value = client
            .get(format!("{session}/jobs"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let jobs = body["data"].as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["text"], "deploy it");
        assert_eq!(jobs[0]["status"], "pending");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let base = serve().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/api/v1/hosts/10.0.0.1/sessions/ses_1/messages"))
            .json(&serde_json::json!({"text": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_retry_without_failure_is_not_found() {
        let base = serve().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/api/v1/hosts/10.0.0.1/sessions/ses_1/retry"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["errors"][0]["code"], "NO_FAILED_JOB");
    }

    #[tokio::test]
    async fn test_state_polls_unobserved_session() {
        let base = serve().await;
        let body: Value = reqwest::get(format!("{base}/api/v1/hosts/10.0.0.1/sessions/ses_1/state"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"]["message_count"], 2);
        assert_eq!(body["data"]["last_message"]["text"], "all green");
    }

    #[tokio::test]
    async fn test_share_records_url() {
        let base = serve().await;
        let body: Value = reqwest::Client::new()
            .post(format!("{base}/api/v1/hosts/10.0.0.1/sessions/ses_1/share"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["data"]["url"], "https://share.test/ses_1");
    }

    #[tokio::test]
    async fn test_events_stream_emits_snapshot() {
        let base = serve().await;
        let mut resp = reqwest::get(format!("{base}/api/v1/hosts/10.0.0.1/sessions/ses_1/events"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let mut received = String::new();
        while !received.contains("\n\n") {
            let chunk = resp.chunk().await.unwrap().expect("stream ended early");
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
        assert!(received.contains("event: snapshot"));
        assert!(received.contains("all green"));
    }
}
