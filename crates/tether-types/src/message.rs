//! Message types observed on remote chat sessions.
//!
//! `RemoteMessage` is what the chat server returns when listing a session.
//! `RecentMessage` is the normalized single-text view used for display windows
//! and for summary fingerprints.

use serde::{Deserialize, Serialize};

/// Role used when the remote message carries none.
pub const DEFAULT_ROLE: &str = "message";

/// One message as listed by the remote chat server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Text parts in order. Non-text parts are dropped by the client.
    #[serde(default)]
    pub texts: Vec<String>,
}

impl RemoteMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            texts: vec![text.into()],
        }
    }
}

/// Normalized view of one message: a role and a single text body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentMessage {
    pub role: String,
    pub text: String,
}

impl RecentMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }

    /// Normalize a remote message, joining its text parts with newlines.
    ///
    /// Falls back to [`DEFAULT_ROLE`] when the role is missing or blank. When
    /// `max_chars` is set the text is truncated to that many characters.
    pub fn from_remote(msg: &RemoteMessage, max_chars: Option<usize>) -> Self {
        let role = msg
            .role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE)
            .to_string();
        let mut text = msg.texts.join("\n");
        if let Some(max) = max_chars {
            if let Some((idx, _)) = text.char_indices().nth(max) {
                text.truncate(idx);
            }
        }
        Self { role, text }
    }
}

/// Return the trailing `n` elements of `items` (all of them when shorter).
pub fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
