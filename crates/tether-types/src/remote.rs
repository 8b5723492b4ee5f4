//! Result shapes returned by the remote chat server client.

use serde::{Deserialize, Serialize};

/// Outcome of sending a message into a remote session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub ok: bool,
    #[serde(default)]
    pub reply_texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(reply_texts: Vec<String>) -> Self {
        Self {
            ok: true,
            reply_texts,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            reply_texts: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Outcome of asking the remote server to summarize a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SummarizeOutcome {
    pub fn summarized(summary: impl Into<String>, action: bool) -> Self {
        Self {
            ok: true,
            summary: Some(summary.into()),
            action: Some(action),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            summary: None,
            action: None,
            error: Some(error.into()),
        }
    }
}

/// A session as listed or created on the remote chat server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Unix epoch milliseconds, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

/// Tagged decode result for loosely-typed remote JSON.
///
/// Remote payloads are decoded field by field with named fallbacks; a payload
/// that has none of the accepted shapes becomes `Malformed` with a reason
/// instead of a panic or a silently defaulted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Ok(T),
    Malformed(String),
}

impl<T> Parsed<T> {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Parsed::Malformed(reason.into())
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Parsed::Ok(v) => Ok(v),
            Parsed::Malformed(reason) => Err(reason),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Ok(v) => Some(v),
            Parsed::Malformed(_) => None,
        }
    }
}
