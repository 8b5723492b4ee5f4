//! Aggregated per-session state served to live observers.
//!
//! One `AggregatedState` exists per [`SessionKey`]. It merges the latest poll
//! of the remote session, the cached summary, and running counters into one
//! record that observers receive as a snapshot on every update cycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::RecentMessage;
use crate::session::SessionKey;

/// Kind tag of the synthetic event emitted when a session's message count changes.
pub const MESSAGE_UPDATE_EVENT: &str = "session.message.update";

/// Identity of the session an aggregated record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMeta {
    pub ip: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Event counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub total_events: u64,
    /// Poll results received from the remote server.
    pub upstream_events: u64,
    /// Synthetic `session.message.update` events derived from polls.
    pub synthetic_message_updates: u64,
}

/// Latest text of one streamed message part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartEntry {
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

/// Mutable aggregated view of one remote session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedState {
    pub meta: StateMeta,
    pub counts: EventCounts,
    pub last_message: Option<RecentMessage>,
    /// Display window: the trailing messages of the last poll.
    pub last_messages: Vec<RecentMessage>,
    pub message_count: usize,
    pub parts: HashMap<String, PartEntry>,
    /// Most recent event types, oldest first.
    pub last_types: Vec<String>,
    /// Unix epoch milliseconds of the last recorded event, 0 when none.
    pub last_event_ts: i64,
    pub reconnects: u64,
    pub summary: String,
    pub action_flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

impl AggregatedState {
    /// Zero-valued record for `key`.
    pub fn new(key: &SessionKey) -> Self {
        Self {
            meta: StateMeta {
                ip: key.ip().to_string(),
                session_id: key.session_id().to_string(),
                created_at: Utc::now(),
            },
            counts: EventCounts::default(),
            last_message: None,
            last_messages: Vec::new(),
            message_count: 0,
            parts: HashMap::new(),
            last_types: Vec::new(),
            last_event_ts: 0,
            reconnects: 0,
            summary: String::new(),
            action_flag: false,
            share_url: None,
        }
    }
}

/// Poll result fed into the aggregated store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResult {
    /// Display window (already truncated to the trailing messages).
    pub last_messages: Vec<RecentMessage>,
    /// Total number of messages in the remote session.
    pub message_count: usize,
}

/// Synthetic or derived event kept in a session's bounded event ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    /// Unix epoch milliseconds.
    pub ts: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SessionEvent {
    /// Build the `session.message.update` event for a count change.
    pub fn message_update(key: &SessionKey, previous: usize, current: usize) -> Self {
        Self {
            kind: MESSAGE_UPDATE_EVENT.to_string(),
            ts: Utc::now().timestamp_millis(),
            payload: serde_json::json!({
                "sessionId": key.session_id(),
                "previousCount": previous,
                "messageCount": current,
            }),
        }
    }
}

/// Observer-facing payload emitted on every update cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: AggregatedState,
    pub recent_events: Vec<SessionEvent>,
}
