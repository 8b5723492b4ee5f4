//! Outbound message queue.
//!
//! Jobs from every session share one global FIFO and are delivered in arrival
//! order by a single drain pass at a time. Each session also keeps a history
//! of its job ids so failed deliveries can be retried, automatically once on
//! the next enqueue or manually through [`OutboundQueue::retry_last_failed`].
//!
//! The FIFO, history, and job table live under one `std::sync::Mutex` that is
//! never held across an `.await`; exclusivity of draining is a separate
//! `tokio::sync::Mutex` taken with `try_lock`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tether_types::config::{QueueConfig, RemoteConfig};
use tether_types::error::QueueError;
use tether_types::queue::{DrainReport, JobStatus, QueuedMessageJob};
use tether_types::session::SessionKey;
use tether_types::summary::{SEND_FAILED, SUMMARY_PENDING};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::remote::BoxChatBackend;
use crate::state::AggregatedStateStore;

struct JobSlot {
    key: SessionKey,
    job: QueuedMessageJob,
}

#[derive(Default)]
struct QueueInner {
    jobs: HashMap<Uuid, JobSlot>,
    fifo: VecDeque<Uuid>,
    history: HashMap<SessionKey, Vec<Uuid>>,
}

impl QueueInner {
    fn push(&mut self, key: &SessionKey, job: QueuedMessageJob) -> Uuid {
        let id = job.id;
        self.fifo.push_back(id);
        self.history.entry(key.clone()).or_default().push(id);
        self.jobs.insert(
            id,
            JobSlot {
                key: key.clone(),
                job,
            },
        );
        id
    }

    /// Newest failed job of `key` accepted by `filter`.
    fn latest_failed(
        &self,
        key: &SessionKey,
        filter: impl Fn(&QueuedMessageJob) -> bool,
    ) -> Option<Uuid> {
        self.history.get(key)?.iter().rev().copied().find(|id| {
            self.jobs
                .get(id)
                .is_some_and(|slot| slot.job.status == JobStatus::Failed && filter(&slot.job))
        })
    }

    /// Enqueue a retry of `source`, marking the source as retried.
    fn push_retry(&mut self, key: &SessionKey, source: Uuid) -> Option<Uuid> {
        let slot = self.jobs.get_mut(&source)?;
        slot.job.retried = true;
        let retry = QueuedMessageJob::retry_of(&slot.job);
        Some(self.push(key, retry))
    }

    /// Evict the oldest settled jobs of `key` beyond `cap`.
    ///
    /// Settled means sent, or failed with a retry already enqueued. Pending,
    /// in-flight, and unretried failures are never evicted.
    fn enforce_retention(&mut self, key: &SessionKey, cap: usize) -> usize {
        let Some(ids) = self.history.get_mut(key) else {
            return 0;
        };
        let mut evicted = 0;
        while ids.len() > cap {
            let position = ids.iter().position(|id| {
                self.jobs.get(id).is_none_or(|slot| match slot.job.status {
                    JobStatus::Sent => true,
                    JobStatus::Failed => slot.job.retried,
                    JobStatus::Pending | JobStatus::Sending => false,
                })
            });
            let Some(position) = position else {
                break;
            };
            let id = ids.remove(position);
            self.jobs.remove(&id);
            evicted += 1;
        }
        evicted
    }
}

/// Global FIFO of outbound messages with per-session retry tracking.
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    drain_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    backend: BoxChatBackend,
    states: Arc<AggregatedStateStore>,
    remote: RemoteConfig,
    config: QueueConfig,
}

impl OutboundQueue {
    pub fn new(
        backend: BoxChatBackend,
        states: Arc<AggregatedStateStore>,
        remote: RemoteConfig,
        config: QueueConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            drain_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            backend,
            states,
            remote,
            config,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().expect("queue lock poisoned")
    }

    /// Append a message for `key` and return the new FIFO length.
    ///
    /// If the session's newest unretried failure exists, a retry of it is
    /// enqueued first.
    pub fn enqueue(&self, key: &SessionKey, text: &str) -> usize {
        let (len, retried) = {
            let mut inner = self.lock();
            let retried = inner
                .latest_failed(key, |job| !job.retried)
                .and_then(|source| inner.push_retry(key, source));
            inner.push(key, QueuedMessageJob::new(key.ip(), key.session_id(), text));
            inner.enforce_retention(key, self.config.history_cap);
            (inner.fifo.len(), retried)
        };

        if let Some(retry_id) = retried {
            info!(key = %key, %retry_id, "auto-retrying last failed message");
            self.states
                .replace_summary_if(key, SEND_FAILED, SUMMARY_PENDING);
        }
        debug!(key = %key, queue_len = len, "message enqueued");
        self.wake.notify_one();
        len
    }

    /// Enqueue a fresh copy of the session's newest failed job.
    pub fn retry_last_failed(&self, key: &SessionKey) -> Result<Uuid, QueueError> {
        let id = {
            let mut inner = self.lock();
            inner
                .latest_failed(key, |_| true)
                .and_then(|source| inner.push_retry(key, source))
        }
        .ok_or_else(|| QueueError::NoFailedJob(key.to_string()))?;

        info!(key = %key, retry_id = %id, "manual retry enqueued");
        self.wake.notify_one();
        Ok(id)
    }

    /// Deliver queued jobs until the FIFO is empty.
    ///
    /// Returns immediately with `skipped = true` if another drain is running.
    pub async fn drain(&self) -> DrainReport {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            return DrainReport {
                skipped: true,
                ..DrainReport::default()
            };
        };

        let mut report = DrainReport::default();
        while let Some((id, key, text)) = self.pop_next() {
            let endpoint = self.remote.endpoint_for(key.ip());
            let error = match self
                .backend
                .send_message(&endpoint, key.session_id(), &text)
                .await
            {
                Ok(outcome) if outcome.ok => None,
                Ok(outcome) => Some(
                    outcome
                        .error
                        .unwrap_or_else(|| "send rejected".to_string()),
                ),
                Err(e) => Some(e.to_string()),
            };

            self.finish(id, error.clone());
            match error {
                None => {
                    report.sent += 1;
                    self.states
                        .replace_summary_if(&key, SEND_FAILED, SUMMARY_PENDING);
                    debug!(key = %key, job_id = %id, "message delivered");
                }
                Some(error) => {
                    report.failed += 1;
                    self.states.set_summary(&key, SEND_FAILED, false);
                    warn!(key = %key, job_id = %id, %error, "message delivery failed");
                }
            }

            let delay = self.config.inter_job_delay();
            if !delay.is_zero() && self.pending_len() > 0 {
                tokio::time::sleep(delay).await;
            }
        }
        report
    }

    fn pop_next(&self) -> Option<(Uuid, SessionKey, String)> {
        let mut inner = self.lock();
        while let Some(id) = inner.fifo.pop_front() {
            if let Some(slot) = inner.jobs.get_mut(&id) {
                slot.job.status = JobStatus::Sending;
                slot.job.attempts += 1;
                return Some((id, slot.key.clone(), slot.job.text.clone()));
            }
        }
        None
    }

    fn finish(&self, id: Uuid, error: Option<String>) {
        let mut inner = self.lock();
        if let Some(slot) = inner.jobs.get_mut(&id) {
            match error {
                None => slot.job.status = JobStatus::Sent,
                Some(error) => {
                    slot.job.status = JobStatus::Failed;
                    slot.job.last_error = Some(error);
                }
            }
        }
    }

    /// Drain on every enqueue and on the configured interval until cancelled.
    pub async fn run_worker(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.drain_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("outbound queue worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = interval.tick() => {}
            }
            let report = self.drain().await;
            if report.sent > 0 || report.failed > 0 {
                debug!(sent = report.sent, failed = report.failed, "queue drained");
            }
        }
        info!("outbound queue worker stopped");
    }

    /// Jobs of one session, oldest first.
    pub fn history(&self, key: &SessionKey) -> Vec<QueuedMessageJob> {
        let inner = self.lock();
        inner
            .history
            .get(key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.jobs.get(id).map(|slot| slot.job.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn job(&self, id: &Uuid) -> Option<QueuedMessageJob> {
        self.lock().jobs.get(id).map(|slot| slot.job.clone())
    }

    /// Number of jobs waiting in the FIFO.
    pub fn pending_len(&self) -> usize {
        self.lock().fifo.len()
    }
}

impl std::fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::test_support::FakeBackend;

    fn build(backend: &FakeBackend, history_cap: usize) -> (Arc<OutboundQueue>, Arc<AggregatedStateStore>) {
        let states = Arc::new(AggregatedStateStore::new());
        let config = QueueConfig {
            inter_job_delay_ms: 0,
            history_cap,
            ..QueueConfig::default()
        };
        let queue = Arc::new(OutboundQueue::new(
            BoxChatBackend::new(backend.clone()),
            Arc::clone(&states),
            RemoteConfig::default(),
            config,
        ));
        (queue, states)
    }

    fn key_a() -> SessionKey {
        SessionKey::new("10.0.0.1", "a")
    }

    fn key_b() -> SessionKey {
        SessionKey::new("10.0.0.2", "b")
    }

    #[tokio::test]
    async fn test_global_fifo_order() {
        let backend = FakeBackend::new();
        let (queue, _) = build(&backend, 50);

        assert_eq!(queue.enqueue(&key_a(), "J1"), 1);
        assert_eq!(queue.enqueue(&key_b(), "J2"), 2);
        assert_eq!(queue.enqueue(&key_a(), "J3"), 3);

        let report = queue.drain().await;
        assert_eq!(report.sent, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.skipped);

        let order: Vec<String> = backend.sent().into_iter().map(|(_, text)| text).collect();
        assert_eq!(order, vec!["J1", "J2", "J3"]);
        assert_eq!(queue.pending_len(), 0);

        let history = queue.history(&key_a());
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|j| j.status == JobStatus::Sent && j.attempts == 1));
    }

    #[tokio::test]
    async fn test_failure_marks_job_and_state() {
        let backend = FakeBackend::new();
        backend.set_fail_sends(true);
        let (queue, states) = build(&backend, 50);
        states.get_or_create(&key_a());
        states.set_summary(&key_a(), "Reviewing the diff", true);

        queue.enqueue(&key_a(), "hello");
        let report = queue.drain().await;
        assert_eq!(report.failed, 1);

        let job = &queue.history(&key_a())[0];
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("session busy"));

        let state = states.snapshot(&key_a()).unwrap();
        assert_eq!(state.summary, SEND_FAILED);
        assert!(!state.action_flag);
    }

    #[tokio::test]
    async fn test_auto_retry_happens_once() {
        let backend = FakeBackend::new();
        let (queue, states) = build(&backend, 50);
        states.get_or_create(&key_a());

        backend.set_fail_sends(true);
        queue.enqueue(&key_a(), "first");
        queue.drain().await;
        backend.set_fail_sends(false);

        // Retry of "first" goes in ahead of "second"
        assert_eq!(queue.enqueue(&key_a(), "second"), 2);
        assert_eq!(states.snapshot(&key_a()).unwrap().summary, SUMMARY_PENDING);

        let history = queue.history(&key_a());
        assert_eq!(history.len(), 3);
        assert!(history[0].retried);
        assert_eq!(history[1].text, "first");
        assert_eq!(history[1].retry_of, Some(history[0].id));
        assert_eq!(history[2].text, "second");

        // Already auto-retried: no second automatic retry
        assert_eq!(queue.enqueue(&key_a(), "third"), 3);
        assert_eq!(queue.history(&key_a()).len(), 4);

        queue.drain().await;
        let order: Vec<String> = backend.sent().into_iter().map(|(_, text)| text).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_manual_retry() {
        let backend = FakeBackend::new();
        let (queue, _) = build(&backend, 50);

        assert_eq!(
            queue.retry_last_failed(&key_a()),
            Err(QueueError::NoFailedJob(key_a().to_string()))
        );

        backend.set_fail_sends(true);
        queue.enqueue(&key_a(), "deploy");
        queue.drain().await;

        let id = queue.retry_last_failed(&key_a()).unwrap();
        assert_eq!(queue.pending_len(), 1);
        let retry = queue.job(&id).unwrap();
        assert_eq!(retry.text, "deploy");
        assert_eq!(retry.status, JobStatus::Pending);
        assert_eq!(retry.retry_of, Some(queue.history(&key_a())[0].id));
        assert!(queue.history(&key_a())[0].retried);

        // Manual retry consumes the automatic one
        queue.enqueue(&key_a(), "next");
        assert_eq!(queue.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_inter_job_delay_only_between_jobs() {
        let backend = FakeBackend::new();
        let queue = OutboundQueue::new(
            BoxChatBackend::new(backend.clone()),
            Arc::new(AggregatedStateStore::new()),
            RemoteConfig::default(),
            QueueConfig {
                inter_job_delay_ms: 300,
                ..QueueConfig::default()
            },
        );

        queue.enqueue(&key_a(), "only");
        let started = std::time::Instant::now();
        assert_eq!(queue.drain().await.sent, 1);
        assert!(started.elapsed() < Duration::from_millis(250));

        queue.enqueue(&key_a(), "one");
        queue.enqueue(&key_b(), "two");
        let started = std::time::Instant::now();
        assert_eq!(queue.drain().await.sent, 2);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_skipped() {
        let backend = FakeBackend::new();
        let (queue, _) = build(&backend, 50);
        queue.enqueue(&key_a(), "x");

        let guard = queue.drain_lock.try_lock().unwrap();
        let report = queue.drain().await;
        assert!(report.skipped);
        assert_eq!(queue.pending_len(), 1);
        drop(guard);

        assert_eq!(queue.drain().await.sent, 1);
    }

    #[tokio::test]
    async fn test_history_retention_cap() {
        let backend = FakeBackend::new();
        let (queue, _) = build(&backend, 3);

        for i in 0..6 {
            queue.enqueue(&key_a(), &format!("m{i}"));
            queue.drain().await;
        }
        let texts: Vec<String> = queue.history(&key_a()).into_iter().map(|j| j.text).collect();
        assert_eq!(texts, vec!["m3", "m4", "m5"]);
        assert_eq!(backend.sent().len(), 6);
    }

    #[tokio::test]
    async fn test_retention_never_evicts_pending_jobs() {
        let backend = FakeBackend::new();
        let (queue, _) = build(&backend, 1);

        backend.set_fail_sends(true);
        queue.enqueue(&key_a(), "keep me");
        queue.drain().await;
        backend.set_fail_sends(false);

        // The failure gets auto-retried here, which makes it evictable; the
        // two pending jobs stay even though the cap is 1
        queue.enqueue(&key_a(), "next");
        assert_eq!(queue.pending_len(), 2);
        assert_eq!(queue.history(&key_a()).len(), 2);
        queue.drain().await;
        assert_eq!(backend.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_worker_drains_on_enqueue() {
        let backend = FakeBackend::new();
        let (queue, _) = build(&backend, 50);
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(Arc::clone(&queue).run_worker(cancel.clone()));

        queue.enqueue(&key_a(), "ping");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.sent().len(), 1);

        cancel.cancel();
        worker.await.unwrap();
    }
}
