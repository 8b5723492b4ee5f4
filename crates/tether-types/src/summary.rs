//! Summary cache types and the fixed placeholder texts shown to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown when the session has no messages to summarize.
pub const NO_RECENT_MESSAGES: &str = "(no recent messages)";

/// Shown while a summary is being (re)computed.
pub const SUMMARY_PENDING: &str = "...";

/// Stored when summarization fails. Entries with this text expire on the short TTL.
pub const SUMMARY_FAILED: &str = "(summary failed)";

/// Shown when the last outbound message to the session could not be delivered.
pub const SEND_FAILED: &str = "(send failed)";

/// Last computed summary for one session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCacheEntry {
    /// Fingerprint of the window the summary was computed from.
    pub message_hash: String,
    pub summary: String,
    /// Whether the session needs the user's attention.
    pub action: bool,
    pub cached_at: DateTime<Utc>,
}

impl SummaryCacheEntry {
    /// Whether this entry records a failed summarization.
    pub fn is_failure(&self) -> bool {
        self.summary == SUMMARY_FAILED
    }
}

/// Result of evaluating the summary cache for a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryView {
    pub text: String,
    pub action: bool,
    /// True when the text came from a cache entry with a matching fingerprint.
    pub reuse: bool,
}

impl SummaryView {
    pub fn placeholder(text: &str) -> Self {
        Self {
            text: text.to_string(),
            action: false,
            reuse: false,
        }
    }
}
