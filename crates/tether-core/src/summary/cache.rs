//! Content-addressed summary cache with debounced recomputation.
//!
//! `evaluate` answers from the cache when the fingerprint of the current
//! window matches the stored one. Otherwise it returns the pending
//! placeholder and (re)arms a per-key debounce timer. When the timer fires,
//! at most one summarization per key runs at a time; the result (or the
//! failure placeholder) is stored, mirrored into the aggregated state, and
//! written through to the key-value store when one is configured.
//!
//! Entries expire on a periodic sweep: failures on the short TTL, everything
//! else on the long one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tether_types::config::{RemoteConfig, SummaryConfig};
use tether_types::message::{RecentMessage, tail};
use tether_types::session::SessionKey;
use tether_types::summary::{
    NO_RECENT_MESSAGES, SUMMARY_FAILED, SUMMARY_PENDING, SummaryCacheEntry, SummaryView,
};
use tracing::{debug, info, warn};

use crate::hash::{ContentHasher, Fingerprinter};
use crate::remote::BoxChatBackend;
use crate::schedule::KeyedScheduler;
use crate::state::AggregatedStateStore;
use crate::storage::BoxKvStore;

/// Key prefix of persisted summary entries.
pub const SUMMARY_KEY_PREFIX: &str = "summary::";

/// Stored form of a cache entry. The ip and session id are kept apart from
/// the composite key because IPv6 addresses contain the separator.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSummary {
    ip: String,
    session_id: String,
    #[serde(flatten)]
    entry: SummaryCacheEntry,
}

/// Removes the key from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<SessionKey>>,
    key: SessionKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.key);
    }
}

pub struct SummaryCache {
    entries: DashMap<SessionKey, SummaryCacheEntry>,
    in_flight: Mutex<HashSet<SessionKey>>,
    scheduler: KeyedScheduler<SessionKey>,
    fingerprinter: Fingerprinter,
    backend: BoxChatBackend,
    states: Arc<AggregatedStateStore>,
    kv: Option<BoxKvStore>,
    remote: RemoteConfig,
    config: SummaryConfig,
}

impl SummaryCache {
    pub fn new(
        backend: BoxChatBackend,
        hasher: Arc<dyn ContentHasher>,
        states: Arc<AggregatedStateStore>,
        kv: Option<BoxKvStore>,
        remote: RemoteConfig,
        config: SummaryConfig,
    ) -> Self {
        let fingerprinter = Fingerprinter::new(hasher, config.instruction.clone());
        Self {
            entries: DashMap::new(),
            in_flight: Mutex::new(HashSet::new()),
            scheduler: KeyedScheduler::new(),
            fingerprinter,
            backend,
            states,
            kv,
            remote,
            config,
        }
    }

    /// Summary to show for `window`, scheduling a recomputation on a miss.
    pub fn evaluate(self: &Arc<Self>, key: &SessionKey, window: &[RecentMessage]) -> SummaryView {
        if window.is_empty() {
            return SummaryView::placeholder(NO_RECENT_MESSAGES);
        }

        let window = tail(window, self.config.window_size);
        let hash = self.fingerprinter.fingerprint(window);

        if let Some(entry) = self.entries.get(key) {
            if entry.message_hash == hash {
                return SummaryView {
                    text: entry.summary.clone(),
                    action: entry.action,
                    reuse: true,
                };
            }
        }

        self.schedule_recompute(key.clone(), hash, window.to_vec());
        SummaryView::placeholder(SUMMARY_PENDING)
    }

    fn schedule_recompute(self: &Arc<Self>, key: SessionKey, hash: String, window: Vec<RecentMessage>) {
        let cache: Weak<Self> = Arc::downgrade(self);
        let task_key = key.clone();
        self.scheduler.schedule(key, self.config.debounce(), async move {
            if let Some(cache) = cache.upgrade() {
                cache.recompute(&task_key, hash, &window).await;
            }
        });
    }

    /// Summarize `window` now and store the result under `hash`.
    ///
    /// Returns `None` without calling the backend when a computation for the
    /// key is already running.
    pub async fn recompute(
        &self,
        key: &SessionKey,
        hash: String,
        window: &[RecentMessage],
    ) -> Option<SummaryCacheEntry> {
        let Some(_guard) = self.try_begin(key) else {
            debug!(key = %key, "summary already in flight, skipping");
            return None;
        };

        let endpoint = self.remote.endpoint_for(key.ip());
        let result = self
            .backend
            .summarize(&endpoint, window, key.session_id(), &self.config.instruction)
            .await;

        let (summary, action) = match result {
            Ok(outcome) if outcome.ok => {
                match outcome.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                    Some(text) => (text.to_string(), outcome.action.unwrap_or(false)),
                    None => {
                        warn!(key = %key, "summarizer returned an empty summary");
                        (SUMMARY_FAILED.to_string(), false)
                    }
                }
            }
            Ok(outcome) => {
                warn!(
                    key = %key,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "summarizer rejected request"
                );
                (SUMMARY_FAILED.to_string(), false)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "summarize call failed");
                (SUMMARY_FAILED.to_string(), false)
            }
        };

        let entry = SummaryCacheEntry {
            message_hash: hash,
            summary,
            action,
            cached_at: Utc::now(),
        };
        self.entries.insert(key.clone(), entry.clone());
        self.states.merge_summary(
            key,
            &SummaryView {
                text: entry.summary.clone(),
                action: entry.action,
                reuse: false,
            },
        );
        debug!(key = %key, failed = entry.is_failure(), "summary stored");

        self.persist(key, &entry).await;
        Some(entry)
    }

    fn try_begin(&self, key: &SessionKey) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().expect("in-flight lock poisoned");
        if !set.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            key: key.clone(),
        })
    }

    async fn persist(&self, key: &SessionKey, entry: &SummaryCacheEntry) {
        let Some(kv) = self.kv.as_ref().filter(|_| self.config.persist) else {
            return;
        };
        let record = PersistedSummary {
            ip: key.ip().to_string(),
            session_id: key.session_id().to_string(),
            entry: entry.clone(),
        };
        let value = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode summary");
                return;
            }
        };
        if let Err(e) = kv.set(&storage_key(key), &value).await {
            warn!(key = %key, error = %e, "failed to persist summary");
        }
    }

    /// Load persisted entries. Malformed records are skipped. Returns the
    /// number of entries restored.
    pub async fn restore(&self) -> usize {
        let Some(kv) = self.kv.as_ref().filter(|_| self.config.persist) else {
            return 0;
        };
        let keys = match kv.list_keys(SUMMARY_KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list persisted summaries");
                return 0;
            }
        };

        let mut restored = 0;
        for raw in keys {
            let value = match kv.get(&raw).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %raw, error = %e, "failed to read persisted summary");
                    continue;
                }
            };
            match serde_json::from_value::<PersistedSummary>(value) {
                Ok(record) => {
                    let key = SessionKey::new(&record.ip, &record.session_id);
                    self.entries.insert(key, record.entry);
                    restored += 1;
                }
                Err(e) => warn!(key = %raw, error = %e, "skipping malformed summary record"),
            }
        }
        info!(restored, "restored persisted summaries");
        restored
    }

    /// Evict expired entries. Returns the evicted keys.
    pub async fn sweep(&self) -> Vec<SessionKey> {
        self.sweep_at(Utc::now()).await
    }

    /// Evict entries that are expired as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<SessionKey> {
        let success_ttl = to_delta(self.config.success_ttl());
        let failure_ttl = to_delta(self.config.failure_ttl());

        let mut evicted = Vec::new();
        self.entries.retain(|key, entry| {
            let ttl = if entry.is_failure() {
                failure_ttl
            } else {
                success_ttl
            };
            let expired = now.signed_duration_since(entry.cached_at) > ttl;
            if expired {
                evicted.push(key.clone());
            }
            !expired
        });

        if let Some(kv) = self.kv.as_ref().filter(|_| self.config.persist) {
            for key in &evicted {
                if let Err(e) = kv.delete(&storage_key(key)).await {
                    warn!(key = %key, error = %e, "failed to delete persisted summary");
                }
            }
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "swept expired summaries");
        }
        evicted
    }

    /// Drop the entry and any pending recomputation for `key`.
    pub async fn invalidate(&self, key: &SessionKey) {
        self.scheduler.cancel(key);
        self.entries.remove(key);
        if let Some(kv) = self.kv.as_ref().filter(|_| self.config.persist) {
            if let Err(e) = kv.delete(&storage_key(key)).await {
                warn!(key = %key, error = %e, "failed to delete persisted summary");
            }
        }
    }

    pub fn entry(&self, key: &SessionKey) -> Option<SummaryCacheEntry> {
        self.entries.get(key).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a debounced recomputation is armed for `key`.
    pub fn is_pending(&self, key: &SessionKey) -> bool {
        self.scheduler.is_pending(key)
    }

    pub fn is_in_flight(&self, key: &SessionKey) -> bool {
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .contains(key)
    }

    /// Cancel every pending recomputation.
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
    }
}

impl std::fmt::Debug for SummaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryCache")
            .field("entries", &self.entries.len())
            .field("pending", &self.scheduler.pending_count())
            .finish_non_exhaustive()
    }
}

fn storage_key(key: &SessionKey) -> String {
    format!("{SUMMARY_KEY_PREFIX}{key}")
}

fn to_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::storage::MemoryKvStore;
    use crate::test_support::{FakeBackend, PlainHasher};

    const DEBOUNCE_MS: u64 = 20;

    fn key() -> SessionKey {
        SessionKey::new("10.0.0.1", "s1")
    }

    fn window(texts: &[&str]) -> Vec<RecentMessage> {
        texts.iter().map(|t| RecentMessage::new("user", *t)).collect()
    }

    fn build(backend: &FakeBackend, kv: Option<BoxKvStore>) -> (Arc<SummaryCache>, Arc<AggregatedStateStore>) {
        let states = Arc::new(AggregatedStateStore::new());
        let config = SummaryConfig {
            debounce_ms: DEBOUNCE_MS,
            ..SummaryConfig::default()
        };
        let cache = Arc::new(SummaryCache::new(
            BoxChatBackend::new(backend.clone()),
            Arc::new(PlainHasher),
            Arc::clone(&states),
            kv,
            RemoteConfig::default(),
            config,
        ));
        (cache, states)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS * 5)).await;
    }

    #[tokio::test]
    async fn test_empty_window_returns_placeholder_without_scheduling() {
        let backend = FakeBackend::new();
        let (cache, _) = build(&backend, None);

        let view = cache.evaluate(&key(), &[]);
        assert_eq!(view.text, NO_RECENT_MESSAGES);
        assert!(!view.action);
        assert!(!view.reuse);
        assert!(!cache.is_pending(&key()));

        settle().await;
        assert_eq!(backend.summarize_calls(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_miss_then_reuse() {
        let backend = FakeBackend::new();
        let (cache, _) = build(&backend, None);
        let w = window(&["fix the build"]);

        let first = cache.evaluate(&key(), &w);
        assert_eq!(first.text, SUMMARY_PENDING);
        assert!(!first.reuse);
        assert!(cache.is_pending(&key()));

        settle().await;
        assert_eq!(backend.summarize_calls(), 1);

        let second = cache.evaluate(&key(), &w);
        assert!(second.reuse);
        assert_eq!(second.text, "summary #1: fix the build");

        // A window with a different fingerprint misses again
        let third = cache.evaluate(&key(), &window(&["fix the build", "done?"]));
        assert!(!third.reuse);
        assert_eq!(third.text, SUMMARY_PENDING);
    }

    #[tokio::test]
    async fn test_debounce_coalesces_evaluations() {
        let backend = FakeBackend::new();
        let (cache, _) = build(&backend, None);

        cache.evaluate(&key(), &window(&["a"]));
        cache.evaluate(&key(), &window(&["a", "b"]));
        settle().await;

        assert_eq!(backend.summarize_calls(), 1);
        // The stored fingerprint is that of the last scheduled window
        assert!(cache.evaluate(&key(), &window(&["a", "b"])).reuse);
    }

    #[tokio::test]
    async fn test_at_most_one_in_flight() {
        let backend = FakeBackend::new();
        backend.set_summarize_delay(Duration::from_millis(50));
        let (cache, _) = build(&backend, None);
        let w = window(&["hello"]);
        let k = key();

        let (a, b) = tokio::join!(
            cache.recompute(&k, "h1".to_string(), &w),
            cache.recompute(&k, "h2".to_string(), &w),
        );
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
        assert_eq!(backend.summarize_calls(), 1);
        assert!(!cache.is_in_flight(&k));
    }

    #[tokio::test]
    async fn test_failure_stored_and_mirrored() {
        let backend = FakeBackend::new();
        backend.set_fail_summarize(true);
        let (cache, states) = build(&backend, None);
        states.get_or_create(&key());

        let entry = cache
            .recompute(&key(), "h".to_string(), &window(&["x"]))
            .await
            .unwrap();
        assert_eq!(entry.summary, SUMMARY_FAILED);
        assert!(!entry.action);

        let state = states.snapshot(&key()).unwrap();
        assert_eq!(state.summary, SUMMARY_FAILED);
        assert!(!state.action_flag);
    }

    #[tokio::test]
    async fn test_success_mirrors_action_flag() {
        let backend = FakeBackend::new();
        let (cache, states) = build(&backend, None);
        states.get_or_create(&key());

        cache
            .recompute(&key(), "h".to_string(), &window(&["ship it?"]))
            .await
            .unwrap();
        let state = states.snapshot(&key()).unwrap();
        assert_eq!(state.summary, "summary #1: ship it?");
        assert!(state.action_flag);
    }

    #[tokio::test]
    async fn test_sweep_uses_ttl_class_per_entry() {
        let backend = FakeBackend::new();
        let (cache, _) = build(&backend, None);
        let ok_key = SessionKey::new("10.0.0.1", "ok");
        let bad_key = SessionKey::new("10.0.0.1", "bad");

        cache.recompute(&ok_key, "h".to_string(), &window(&["a"])).await;
        backend.set_fail_summarize(true);
        cache.recompute(&bad_key, "h".to_string(), &window(&["a"])).await;
        assert_eq!(cache.len(), 2);

        let now = Utc::now();
        assert!(cache.sweep_at(now).await.is_empty());

        let evicted = cache.sweep_at(now + TimeDelta::seconds(61)).await;
        assert_eq!(evicted, vec![bad_key.clone()]);
        assert!(cache.entry(&ok_key).is_some());

        let evicted = cache.sweep_at(now + TimeDelta::minutes(16)).await;
        assert_eq!(evicted, vec![ok_key]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let backend = FakeBackend::new();
        let kv = BoxKvStore::new(MemoryKvStore::new());
        let (cache, _) = build(&backend, Some(kv.clone()));
        let v6_key = SessionKey::new("fe80::1", "s9");

        cache.recompute(&key(), "h1".to_string(), &window(&["a"])).await;
        cache.recompute(&v6_key, "h2".to_string(), &window(&["b"])).await;
        kv.set("summary::garbage", &json!({"nope": true})).await.unwrap();

        let (fresh, _) = build(&backend, Some(kv.clone()));
        assert_eq!(fresh.restore().await, 2);
        assert_eq!(fresh.entry(&key()).unwrap().message_hash, "h1");
        assert_eq!(fresh.entry(&v6_key).unwrap().message_hash, "h2");

        // Sweeping removes the persisted copy as well
        fresh.sweep_at(Utc::now() + TimeDelta::hours(1)).await;
        assert_eq!(kv.list_keys(SUMMARY_KEY_PREFIX).await.unwrap(), vec!["summary::garbage"]);
    }

    #[tokio::test]
    async fn test_invalidate_cancels_pending() {
        let backend = FakeBackend::new();
        let (cache, _) = build(&backend, None);

        cache.evaluate(&key(), &window(&["a"]));
        assert!(cache.is_pending(&key()));
        cache.invalidate(&key()).await;
        assert!(!cache.is_pending(&key()));

        settle().await;
        assert_eq!(backend.summarize_calls(), 0);
    }
}
