//! Outbound message job types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of a queued outbound message.
///
/// Transitions: `Pending -> Sending -> {Sent | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Sending,
    Failed,
    Sent,
}

impl JobStatus {
    /// Whether the job can no longer change status.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Sending => write!(f, "sending"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Sent => write!(f, "sent"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "sending" => Ok(JobStatus::Sending),
            "failed" => Ok(JobStatus::Failed),
            "sent" => Ok(JobStatus::Sent),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

/// One outbound user message waiting for (or done with) delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessageJob {
    /// UUIDv7, so ids sort by creation time.
    pub id: Uuid,
    pub ip: String,
    pub sid: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Set on a failed job once a retry of it has been enqueued, either
    /// automatically on the next enqueue or by an explicit retry.
    #[serde(default)]
    pub retried: bool,
    /// The failed job this one retries, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<Uuid>,
}

impl QueuedMessageJob {
    pub fn new(ip: impl Into<String>, sid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            ip: ip.into(),
            sid: sid.into(),
            text: text.into(),
            created_at: Utc::now(),
            attempts: 0,
            status: JobStatus::Pending,
            last_error: None,
            retried: false,
            retry_of: None,
        }
    }

    /// Fresh pending job carrying the text of `failed`.
    pub fn retry_of(failed: &QueuedMessageJob) -> Self {
        let mut job = Self::new(failed.ip.clone(), failed.sid.clone(), failed.text.clone());
        job.retry_of = Some(failed.id);
        job
    }
}

/// Outcome counts of one queue drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
    /// True when another drain held the lock and this call did nothing.
    pub skipped: bool,
}
