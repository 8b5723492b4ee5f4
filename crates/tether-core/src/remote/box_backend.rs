//! BoxChatBackend -- object-safe dynamic dispatch wrapper for ChatBackend.
//!
//! Same blanket-impl pattern as the key-value store wrapper:
//! 1. Define an object-safe `ChatBackendDyn` trait with boxed futures
//! 2. Blanket-impl `ChatBackendDyn` for all `T: ChatBackend`
//! 3. `BoxChatBackend` wraps `Arc<dyn ChatBackendDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tether_types::error::RemoteError;
use tether_types::message::{RecentMessage, RemoteMessage};
use tether_types::remote::{RemoteSession, SendOutcome, SummarizeOutcome};

use super::backend::ChatBackend;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Object-safe version of [`ChatBackend`] with boxed futures.
pub trait ChatBackendDyn: Send + Sync {
    fn list_messages_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Vec<RemoteMessage>>;

    fn send_message_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
        text: &'a str,
    ) -> BoxFuture<'a, SendOutcome>;

    fn summarize_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        window: &'a [RecentMessage],
        session_id: &'a str,
        instruction: &'a str,
    ) -> BoxFuture<'a, SummarizeOutcome>;

    fn create_session_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        title: Option<&'a str>,
    ) -> BoxFuture<'a, RemoteSession>;

    fn list_sessions_boxed<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Vec<RemoteSession>>;

    fn delete_session_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, ()>;

    fn share_session_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, String>;
}

impl<T: ChatBackend> ChatBackendDyn for T {
    fn list_messages_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Vec<RemoteMessage>> {
        Box::pin(self.list_messages(endpoint, session_id))
    }

    fn send_message_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
        text: &'a str,
    ) -> BoxFuture<'a, SendOutcome> {
        Box::pin(self.send_message(endpoint, session_id, text))
    }

    fn summarize_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        window: &'a [RecentMessage],
        session_id: &'a str,
        instruction: &'a str,
    ) -> BoxFuture<'a, SummarizeOutcome> {
        Box::pin(self.summarize(endpoint, window, session_id, instruction))
    }

    fn create_session_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        title: Option<&'a str>,
    ) -> BoxFuture<'a, RemoteSession> {
        Box::pin(self.create_session(endpoint, title))
    }

    fn list_sessions_boxed<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Vec<RemoteSession>> {
        Box::pin(self.list_sessions(endpoint))
    }

    fn delete_session_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.delete_session(endpoint, session_id))
    }

    fn share_session_boxed<'a>(
        &'a self,
        endpoint: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, String> {
        Box::pin(self.share_session(endpoint, session_id))
    }
}

/// Type-erased, cheaply cloneable chat backend.
///
/// Cloning shares the same underlying client, so the summary cache, the
/// outbound queue, and every update loop talk through one connection pool.
#[derive(Clone)]
pub struct BoxChatBackend {
    inner: Arc<dyn ChatBackendDyn>,
}

impl BoxChatBackend {
    pub fn new<T: ChatBackend + 'static>(backend: T) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }

    pub async fn list_messages(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        self.inner.list_messages_boxed(endpoint, session_id).await
    }

    pub async fn send_message(
        &self,
        endpoint: &str,
        session_id: &str,
        text: &str,
    ) -> Result<SendOutcome, RemoteError> {
        self.inner.send_message_boxed(endpoint, session_id, text).await
    }

    pub async fn summarize(
        &self,
        endpoint: &str,
        window: &[RecentMessage],
        session_id: &str,
        instruction: &str,
    ) -> Result<SummarizeOutcome, RemoteError> {
        self.inner
            .summarize_boxed(endpoint, window, session_id, instruction)
            .await
    }

    pub async fn create_session(
        &self,
        endpoint: &str,
        title: Option<&str>,
    ) -> Result<RemoteSession, RemoteError> {
        self.inner.create_session_boxed(endpoint, title).await
    }

    pub async fn list_sessions(&self, endpoint: &str) -> Result<Vec<RemoteSession>, RemoteError> {
        self.inner.list_sessions_boxed(endpoint).await
    }

    pub async fn delete_session(&self, endpoint: &str, session_id: &str) -> Result<(), RemoteError> {
        self.inner.delete_session_boxed(endpoint, session_id).await
    }

    pub async fn share_session(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> Result<String, RemoteError> {
        self.inner.share_session_boxed(endpoint, session_id).await
    }
}

impl std::fmt::Debug for BoxChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxChatBackend").finish_non_exhaustive()
    }
}
