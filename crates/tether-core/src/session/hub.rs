//! Session hub -- the container that owns every shared store.
//!
//! One `SessionHub` is built at startup and handed (as `Arc<SessionHub>`) to
//! every observer loop, HTTP handler, and CLI command. It owns the aggregated
//! state store, the summary cache, the outbound queue, and the tick
//! broadcaster, and spawns the background tasks that keep them bounded.

use std::sync::Arc;

use tether_types::config::TetherConfig;
use tether_types::error::{QueueError, RemoteError};
use tether_types::session::SessionKey;
use tether_types::state::{AggregatedState, SessionSnapshot};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::update_loop::UpdateLoop;
use crate::hash::ContentHasher;
use crate::queue::OutboundQueue;
use crate::remote::BoxChatBackend;
use crate::state::AggregatedStateStore;
use crate::storage::BoxKvStore;
use crate::summary::SummaryCache;
use crate::tick::TickBroadcaster;

/// Buffer of snapshots per observer before the loop waits on the consumer.
const OBSERVER_BUFFER: usize = 16;

pub struct SessionHub {
    config: TetherConfig,
    backend: BoxChatBackend,
    states: Arc<AggregatedStateStore>,
    cache: Arc<SummaryCache>,
    queue: Arc<OutboundQueue>,
    ticker: TickBroadcaster,
}

impl SessionHub {
    pub fn new(
        config: TetherConfig,
        backend: BoxChatBackend,
        hasher: Arc<dyn ContentHasher>,
        kv: Option<BoxKvStore>,
    ) -> Arc<Self> {
        let states = Arc::new(AggregatedStateStore::with_event_capacity(
            config.stream.event_ring_capacity,
        ));
        let cache = Arc::new(SummaryCache::new(
            backend.clone(),
            hasher,
            Arc::clone(&states),
            kv,
            config.remote.clone(),
            config.summary.clone(),
        ));
        let queue = Arc::new(OutboundQueue::new(
            backend.clone(),
            Arc::clone(&states),
            config.remote.clone(),
            config.queue.clone(),
        ));
        let ticker = TickBroadcaster::new(config.stream.tick_interval());

        Arc::new(Self {
            config,
            backend,
            states,
            cache,
            queue,
            ticker,
        })
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn backend(&self) -> &BoxChatBackend {
        &self.backend
    }

    pub fn states(&self) -> &Arc<AggregatedStateStore> {
        &self.states
    }

    pub fn cache(&self) -> &Arc<SummaryCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    pub fn ticker(&self) -> &TickBroadcaster {
        &self.ticker
    }

    /// Base URL of the chat server that owns `key`.
    pub fn endpoint_for(&self, key: &SessionKey) -> String {
        self.config.remote.endpoint_for(key.ip())
    }

    /// Load persisted summaries. Returns how many were restored.
    pub async fn restore(&self) -> usize {
        self.cache.restore().await
    }

    /// Start an observer loop for `key`.
    ///
    /// The loop stops when `cancel` fires or the receiver is dropped.
    pub fn observe(
        self: &Arc<Self>,
        key: SessionKey,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<SessionSnapshot> {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        let update_loop = UpdateLoop::new(Arc::clone(self), key);
        tokio::spawn(update_loop.run(cancel, tx));
        rx
    }

    /// Run a single update cycle for `key` without attaching an observer.
    pub async fn poll_once(self: &Arc<Self>, key: SessionKey) -> SessionSnapshot {
        UpdateLoop::new(Arc::clone(self), key).cycle().await
    }

    pub fn snapshot(&self, key: &SessionKey) -> Option<AggregatedState> {
        self.states.snapshot(key)
    }

    pub fn enqueue(&self, key: &SessionKey, text: &str) -> usize {
        self.queue.enqueue(key, text)
    }

    pub fn retry_last_failed(&self, key: &SessionKey) -> Result<Uuid, QueueError> {
        self.queue.retry_last_failed(key)
    }

    /// Publish the remote session and record its share URL.
    pub async fn share(&self, key: &SessionKey) -> Result<String, RemoteError> {
        let url = self
            .backend
            .share_session(&self.endpoint_for(key), key.session_id())
            .await?;
        self.states.set_share_url(key, &url);
        info!(key = %key, %url, "session shared");
        Ok(url)
    }

    /// Drop local state for a session that no longer exists remotely.
    pub async fn forget(&self, key: &SessionKey) {
        self.states.remove(key);
        self.cache.invalidate(key).await;
        debug!(key = %key, "session forgotten");
    }

    /// Spawn the summary sweep, the state pruner, and the queue worker.
    pub fn spawn_background(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let sweep = {
            let hub = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(hub.config.summary.sweep_interval());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            hub.cache.sweep().await;
                        }
                    }
                }
            })
        };

        let prune = {
            let hub = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let limits = &hub.config.state;
                let mut interval = tokio::time::interval(limits.prune_interval());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            hub.states.prune_all(limits.parts_limit, limits.types_limit);
                        }
                    }
                }
            })
        };

        let worker = tokio::spawn(Arc::clone(&self.queue).run_worker(cancel));

        info!("background tasks started");
        vec![sweep, prune, worker]
    }

    /// Cancel pending summary recomputations.
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}

impl std::fmt::Debug for SessionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHub")
            .field("sessions", &self.states.len())
            .field("summaries", &self.cache.len())
            .field("queue", &self.queue.pending_len())
            .finish_non_exhaustive()
    }
}
