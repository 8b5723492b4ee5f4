//! ChatBackend trait definition.
//!
//! The port through which Tether talks to remote chat servers. Every method
//! takes the server's base URL (`endpoint`) because one process observes many
//! servers, one per IP. Uses RPITIT; `BoxChatBackend` provides dynamic dispatch.
//!
//! Implementations live in tether-infra (e.g., `HttpChatBackend`).

use std::future::Future;

use tether_types::error::RemoteError;
use tether_types::message::{RecentMessage, RemoteMessage};
use tether_types::remote::{RemoteSession, SendOutcome, SummarizeOutcome};

/// Client for the remote chat server.
pub trait ChatBackend: Send + Sync {
    /// List the messages of a session, oldest first.
    fn list_messages(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> impl Future<Output = Result<Vec<RemoteMessage>, RemoteError>> + Send;

    /// Post a user message into a session.
    fn send_message(
        &self,
        endpoint: &str,
        session_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<SendOutcome, RemoteError>> + Send;

    /// Ask the server to summarize `window` following `instruction`.
    fn summarize(
        &self,
        endpoint: &str,
        window: &[RecentMessage],
        session_id: &str,
        instruction: &str,
    ) -> impl Future<Output = Result<SummarizeOutcome, RemoteError>> + Send;

    fn create_session(
        &self,
        endpoint: &str,
        title: Option<&str>,
    ) -> impl Future<Output = Result<RemoteSession, RemoteError>> + Send;

    fn list_sessions(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<Vec<RemoteSession>, RemoteError>> + Send;

    fn delete_session(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Publish a session and return its public share URL.
    fn share_session(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;
}
