//! HttpChatBackend -- concrete [`ChatBackend`] over the remote server's JSON API.
//!
//! Routes used (relative to the per-ip endpoint):
//!
//! - `GET    /session`                list sessions
//! - `POST   /session`                create a session
//! - `DELETE /session/{id}`           delete a session
//! - `POST   /session/{id}/share`     publish a session
//! - `GET    /session/{id}/message`   list messages
//! - `POST   /session/{id}/message`   post a message and wait for the reply
//!
//! Summaries are produced by the server's own assistant: a scratch session is
//! created, sent the instruction and the rendered window, and deleted again.
//!
//! The optional bearer token is a [`SecretString`] and never appears in logs.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tether_core::remote::ChatBackend;
use tether_types::config::RemoteConfig;
use tether_types::error::RemoteError;
use tether_types::message::{RecentMessage, RemoteMessage};
use tether_types::remote::{RemoteSession, SendOutcome, SummarizeOutcome};
use tracing::{debug, warn};

use super::parse;

/// Title given to the throwaway sessions used for summarization.
const SCRATCH_TITLE: &str = "tether summary";

pub struct HttpChatBackend {
    client: reqwest::Client,
    token: Option<SecretString>,
}

impl HttpChatBackend {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: config.token.clone().map(SecretString::from),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and decode the body as JSON (`null` when empty).
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<Value, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed(format!("invalid JSON: {e}")))
    }
}

// No Debug derive: keeps the token out of any formatted output.

impl ChatBackend for HttpChatBackend {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn list_messages(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        let url = format!("{endpoint}/session/{session_id}/message");
        let value = self.execute(self.request(reqwest::Method::GET, &url)).await?;
        parse::parse_messages(&value)
            .into_result()
            .map_err(RemoteError::Malformed)
    }

    #[tracing::instrument(skip(self, text), level = "debug", fields(text_len = text.len()))]
    async fn send_message(
        &self,
        endpoint: &str,
        session_id: &str,
        text: &str,
    ) -> Result<SendOutcome, RemoteError> {
        let url = format!("{endpoint}/session/{session_id}/message");
        let body = json!({ "parts": [{ "type": "text", "text": text }] });
        let value = self
            .execute(self.request(reqwest::Method::POST, &url).json(&body))
            .await?;
        Ok(parse::parse_send_reply(&value))
    }

    #[tracing::instrument(skip(self, window, instruction), level = "debug", fields(window = window.len()))]
    async fn summarize(
        &self,
        endpoint: &str,
        window: &[RecentMessage],
        session_id: &str,
        instruction: &str,
    ) -> Result<SummarizeOutcome, RemoteError> {
        let scratch = self.create_session(endpoint, Some(SCRATCH_TITLE)).await?;
        let prompt = parse::render_summary_prompt(instruction, window);
        let reply = self.send_message(endpoint, &scratch.id, &prompt).await;

        if let Err(e) = self.delete_session(endpoint, &scratch.id).await {
            warn!(scratch = %scratch.id, error = %e, "failed to delete scratch session");
        }

        let reply = reply?;
        if !reply.ok {
            return Ok(SummarizeOutcome::failed(
                reply.error.unwrap_or_else(|| "summarization rejected".to_string()),
            ));
        }
        debug!(source = session_id, "summary reply received");
        Ok(parse::parse_summary_reply(&reply.reply_texts))
    }

    async fn create_session(
        &self,
        endpoint: &str,
        title: Option<&str>,
    ) -> Result<RemoteSession, RemoteError> {
        let url = format!("{endpoint}/session");
        let body = match title {
            Some(title) => json!({ "title": title }),
            None => json!({}),
        };
        let value = self
            .execute(self.request(reqwest::Method::POST, &url).json(&body))
            .await?;
        parse::parse_session(&value)
            .into_result()
            .map_err(RemoteError::Malformed)
    }

    async fn list_sessions(&self, endpoint: &str) -> Result<Vec<RemoteSession>, RemoteError> {
        let url = format!("{endpoint}/session");
        let value = self.execute(self.request(reqwest::Method::GET, &url)).await?;
        parse::parse_sessions(&value)
            .into_result()
            .map_err(RemoteError::Malformed)
    }

    async fn delete_session(&self, endpoint: &str, session_id: &str) -> Result<(), RemoteError> {
        let url = format!("{endpoint}/session/{session_id}");
        self.execute(self.request(reqwest::Method::DELETE, &url))
            .await?;
        Ok(())
    }

    async fn share_session(&self, endpoint: &str, session_id: &str) -> Result<String, RemoteError> {
        let url = format!("{endpoint}/session/{session_id}/share");
        let value = self.execute(self.request(reqwest::Method::POST, &url)).await?;
        parse::parse_share_url(&value)
            .into_result()
            .map_err(RemoteError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};

    #[derive(Clone, Default)]
    struct Recorded {
        auth: Arc<Mutex<Vec<String>>>,
        deleted: Arc<Mutex<Vec<String>>>,
    }

    async fn messages(
        State(rec): State<Recorded>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Json<Value> {
        if let Some(auth) = headers.get("authorization") {
            rec.auth.lock().unwrap().push(auth.to_str().unwrap().to_string());
        }
        Json(json!([
            {"info": {"role": "user"}, "parts": [{"type": "text", "text": format!("hello {id}")}]},
            {"info": {"role": "assistant"}, "parts": [{"type": "text", "text": "hi"}]}
        ]))
    }

    async fn reply(Path(id): Path<String>) -> Json<Value> {
        if id == "scratch" {
            Json(json!({"parts": [{"type": "text", "text": "{\"summary\": \"Greeting exchanged\", \"action\": false}"}]}))
        } else {
            Json(json!({"parts": [{"type": "text", "text": "ack"}]}))
        }
    }

    async fn create() -> Json<Value> {
        Json(json!({"id": "scratch", "title": "tether summary"}))
    }

    async fn remove(State(rec): State<Recorded>, Path(id): Path<String>) -> StatusCode {
        rec.deleted.lock().unwrap().push(id);
        StatusCode::NO_CONTENT
    }

    async fn share(Path(id): Path<String>) -> Json<Value> {
        Json(json!({"share": {"url": format!("https://share.test/{id}")}}))
    }

    async fn broken() -> (StatusCode, &'static str) {
        (StatusCode::BAD_GATEWAY, "upstream down")
    }

    async fn serve() -> (String, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route("/session", post(create).get(broken))
            .route("/session/{id}", delete(remove))
            .route("/session/{id}/message", get(messages).post(reply))
            .route("/session/{id}/share", post(share))
            .with_state(recorded.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), recorded)
    }

    fn backend(token: Option<&str>) -> HttpChatBackend {
        let config = RemoteConfig {
            token: token.map(str::to_string),
            ..RemoteConfig::default()
        };
        HttpChatBackend::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_list_messages_with_token() {
        let (endpoint, recorded) = serve().await;
        let messages = backend(Some("t0k3n"))
            .list_messages(&endpoint, "ses_1")
            .await
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role.as_deref(), Some("user"));
        assert_eq!(messages[0].texts, vec!["hello ses_1"]);
        assert_eq!(recorded.auth.lock().unwrap().as_slice(), ["Bearer t0k3n"]);
    }

    #[tokio::test]
    async fn test_send_message() {
        let (endpoint, _) = serve().await;
        let outcome = backend(None).send_message(&endpoint, "ses_1", "go").await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.reply_texts, vec!["ack"]);
    }

    #[tokio::test]
    async fn test_summarize_uses_and_deletes_scratch_session() {
        let (endpoint, recorded) = serve().await;
        let window = vec![RecentMessage::new("user", "hello")];
        let outcome = backend(None)
            .summarize(&endpoint, &window, "ses_1", "Summarize.")
            .await
            .unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.summary.as_deref(), Some("Greeting exchanged"));
        assert_eq!(outcome.action, Some(false));
        assert_eq!(recorded.deleted.lock().unwrap().as_slice(), ["scratch"]);
    }

    #[tokio::test]
    async fn test_share_session() {
        let (endpoint, _) = serve().await;
        let url = backend(None).share_session(&endpoint, "ses_9").await.unwrap();
        assert_eq!(url, "https://share.test/ses_9");
    }

    #[tokio::test]
    async fn test_http_error_maps_to_status() {
        let (endpoint, _) = serve().await;
        let err = backend(None).list_sessions(&endpoint).await.unwrap_err();
        match err {
            RemoteError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let err = backend(None)
            .list_messages("http://127.0.0.1:9", "ses_1")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
