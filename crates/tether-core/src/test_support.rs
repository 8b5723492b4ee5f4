//! Hand-written fakes shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_types::config::TetherConfig;
use tether_types::error::RemoteError;
use tether_types::message::{RecentMessage, RemoteMessage};
use tether_types::remote::{RemoteSession, SendOutcome, SummarizeOutcome};

use crate::hash::ContentHasher;
use crate::remote::ChatBackend;

/// Defaults with timers shortened to tens of milliseconds.
pub fn fast_config() -> TetherConfig {
    let mut config = TetherConfig::default();
    config.summary.debounce_ms = 20;
    config.stream.tick_interval_ms = 20;
    config.queue.inter_job_delay_ms = 0;
    config.queue.drain_interval_ms = 20;
    config
}

/// Identity "hash": returns the content unchanged, which keeps test
/// assertions readable.
pub struct PlainHasher;

impl ContentHasher for PlainHasher {
    fn compute_hash(&self, content: &str) -> String {
        content.to_string()
    }
}

#[derive(Default)]
struct FakeState {
    messages: Mutex<HashMap<String, Vec<RemoteMessage>>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
    fail_list: AtomicBool,
    fail_summarize: AtomicBool,
    summarize_calls: AtomicUsize,
    summarize_delay: Mutex<Duration>,
    created: AtomicUsize,
}

/// Scriptable in-memory chat server. Clones share state.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_messages(&self, session_id: &str, messages: Vec<RemoteMessage>) {
        self.state
            .messages
            .lock()
            .unwrap()
            .insert(session_id.to_string(), messages);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_summarize(&self, fail: bool) {
        self.state.fail_summarize.store(fail, Ordering::SeqCst);
    }

    pub fn set_summarize_delay(&self, delay: Duration) {
        *self.state.summarize_delay.lock().unwrap() = delay;
    }

    pub fn summarize_calls(&self) -> usize {
        self.state.summarize_calls.load(Ordering::SeqCst)
    }

    /// `(session_id, text)` of every successful send, in delivery order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.sent.lock().unwrap().clone()
    }
}

impl ChatBackend for FakeBackend {
    async fn list_messages(
        &self,
        _endpoint: &str,
        session_id: &str,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        if self.state.fail_list.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        Ok(self
            .state
            .messages
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        _endpoint: &str,
        session_id: &str,
        text: &str,
    ) -> Result<SendOutcome, RemoteError> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Ok(SendOutcome::rejected("session busy"));
        }
        self.state
            .sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), text.to_string()));
        Ok(SendOutcome::sent(vec![format!("ack: {text}")]))
    }

    async fn summarize(
        &self,
        _endpoint: &str,
        window: &[RecentMessage],
        _session_id: &str,
        _instruction: &str,
    ) -> Result<SummarizeOutcome, RemoteError> {
        let call = self.state.summarize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.state.summarize_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_summarize.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 500,
                body: "model unavailable".to_string(),
            });
        }
        let last = window.last().map(|m| m.text.as_str()).unwrap_or_default();
        Ok(SummarizeOutcome::summarized(
            format!("summary #{call}: {last}"),
            last.ends_with('?'),
        ))
    }

    async fn create_session(
        &self,
        _endpoint: &str,
        title: Option<&str>,
    ) -> Result<RemoteSession, RemoteError> {
        let n = self.state.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteSession {
            id: format!("ses_{n}"),
            title: title.map(str::to_string),
            created_at: None,
            share_url: None,
        })
    }

    async fn list_sessions(&self, _endpoint: &str) -> Result<Vec<RemoteSession>, RemoteError> {
        let mut ids: Vec<String> = self.state.messages.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| RemoteSession {
                id,
                title: None,
                created_at: None,
                share_url: None,
            })
            .collect())
    }

    async fn delete_session(&self, _endpoint: &str, session_id: &str) -> Result<(), RemoteError> {
        self.state.messages.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn share_session(&self, endpoint: &str, session_id: &str) -> Result<String, RemoteError> {
        Ok(format!("{endpoint}/s/{session_id}"))
    }
}
