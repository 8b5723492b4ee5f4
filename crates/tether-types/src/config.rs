//! Configuration types for Tether.
//!
//! `TetherConfig` represents the top-level `config.toml`. Every field has a
//! serde default, so an empty file (or no file) yields a working setup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Instruction sent to the remote server when summarizing a window.
///
/// Also salts the fingerprint, so editing it invalidates every cached summary.
pub const DEFAULT_SUMMARY_INSTRUCTION: &str = "Summarize what is happening in this chat in one or two short sentences. \
Reply with JSON: {\"summary\": \"...\", \"action\": true|false}, where action is true only if the assistant is waiting on the user.";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// HTTP listener and target allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Chat server IPs that may be observed. Empty allows every IP.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_ips: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Whether `ip` passes the allow-list.
    pub fn is_allowed(&self, ip: &str) -> bool {
        self.allowed_ips.is_empty() || self.allowed_ips.iter().any(|allowed| allowed == ip)
    }
}

/// How to reach the chat server on a given IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional bearer token sent with every request.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_remote_port() -> u16 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            port: default_remote_port(),
            request_timeout_secs: default_request_timeout_secs(),
            token: None,
        }
    }
}

impl RemoteConfig {
    /// Base URL of the chat server at `ip`. IPv6 literals are bracketed.
    pub fn endpoint_for(&self, ip: &str) -> String {
        if ip.contains(':') && !ip.starts_with('[') {
            format!("{}://[{ip}]:{}", self.scheme, self.port)
        } else {
            format!("{}://{ip}:{}", self.scheme, self.port)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Summary cache tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_instruction")]
    pub instruction: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_success_ttl_secs")]
    pub success_ttl_secs: u64,
    #[serde(default = "default_failure_ttl_secs")]
    pub failure_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Number of trailing messages fingerprinted and summarized.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Write summaries through to the persistent key-value store.
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_instruction() -> String {
    DEFAULT_SUMMARY_INSTRUCTION.to_string()
}

fn default_debounce_ms() -> u64 {
    2_000
}

fn default_success_ttl_secs() -> u64 {
    15 * 60
}

fn default_failure_ttl_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_window_size() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            instruction: default_instruction(),
            debounce_ms: default_debounce_ms(),
            success_ttl_secs: default_success_ttl_secs(),
            failure_ttl_secs: default_failure_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            window_size: default_window_size(),
            persist: default_true(),
        }
    }
}

impl SummaryConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_ttl_secs)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Aggregated state pruning limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_parts_limit")]
    pub parts_limit: usize,
    #[serde(default = "default_types_limit")]
    pub types_limit: usize,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_parts_limit() -> usize {
    200
}

fn default_types_limit() -> usize {
    50
}

fn default_prune_interval_secs() -> u64 {
    60
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            parts_limit: default_parts_limit(),
            types_limit: default_types_limit(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

impl StateConfig {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Outbound queue tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause between two deliveries so a long backlog does not starve other work.
    #[serde(default = "default_inter_job_delay_ms")]
    pub inter_job_delay_ms: u64,
    /// Periodic drain trigger, independent of enqueue notifications.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Maximum jobs kept in one session's history.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_inter_job_delay_ms() -> u64 {
    10
}

fn default_drain_interval_ms() -> u64 {
    1_000
}

fn default_history_cap() -> usize {
    50
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inter_job_delay_ms: default_inter_job_delay_ms(),
            drain_interval_ms: default_drain_interval_ms(),
            history_cap: default_history_cap(),
        }
    }
}

impl QueueConfig {
    pub fn inter_job_delay(&self) -> Duration {
        Duration::from_millis(self.inter_job_delay_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Observer update loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Trailing messages kept in the display window.
    #[serde(default = "default_display_window")]
    pub display_window: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_event_ring_capacity")]
    pub event_ring_capacity: usize,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_tick_interval_ms() -> u64 {
    2_000
}

fn default_display_window() -> usize {
    10
}

fn default_max_message_chars() -> usize {
    2_000
}

fn default_event_ring_capacity() -> usize {
    100
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            display_window: default_display_window(),
            max_message_chars: default_max_message_chars(),
            event_ring_capacity: default_event_ring_capacity(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl StreamConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}
