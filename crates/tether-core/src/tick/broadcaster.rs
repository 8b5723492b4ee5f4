//! Shared periodic tick fanned out to per-session listeners.
//!
//! Every observer loop needs a periodic wake-up. Instead of one timer per
//! observer, the `TickBroadcaster` runs a single interval task while at least
//! one listener is subscribed and invokes every listener on each tick. The
//! task starts with the first subscription and is aborted when the last one
//! goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tether_types::session::SessionKey;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Callback run on every tick. Must not block.
pub type TickListener = Arc<dyn Fn(&SessionKey) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: HashMap<SessionKey, Vec<(u64, TickListener)>>,
    next_id: u64,
    timer: Option<JoinHandle<()>>,
}

impl Registry {
    fn subscriber_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }
}

pub struct TickBroadcaster {
    registry: Arc<Mutex<Registry>>,
    period: Duration,
}

impl TickBroadcaster {
    pub fn new(period: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            period,
        }
    }

    /// Register `listener` under `key`, starting the shared timer if it is
    /// the first subscriber. Must be called from within a Tokio runtime.
    pub fn subscribe(&self, key: &SessionKey, listener: TickListener) -> TickSubscription {
        let mut registry = self.registry.lock().expect("tick registry lock poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .listeners
            .entry(key.clone())
            .or_default()
            .push((id, listener));

        if registry.timer.is_none() {
            registry.timer = Some(spawn_timer(Arc::downgrade(&self.registry), self.period));
            debug!(period_ms = self.period.as_millis() as u64, "tick timer started");
        }

        TickSubscription {
            registry: Arc::downgrade(&self.registry),
            key: key.clone(),
            id,
            active: true,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .expect("tick registry lock poisoned")
            .subscriber_count()
    }

    /// Number of keys with at least one listener.
    pub fn key_count(&self) -> usize {
        self.registry
            .lock()
            .expect("tick registry lock poisoned")
            .listeners
            .len()
    }

    /// Whether the shared timer task exists.
    pub fn is_running(&self) -> bool {
        self.registry
            .lock()
            .expect("tick registry lock poisoned")
            .timer
            .is_some()
    }
}

impl Drop for TickBroadcaster {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            if let Some(timer) = registry.timer.take() {
                timer.abort();
            }
        }
    }
}

impl std::fmt::Debug for TickBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickBroadcaster")
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

fn spawn_timer(registry: Weak<Mutex<Registry>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            // Listeners run outside the lock so they may subscribe or unsubscribe.
            let targets: Vec<(SessionKey, TickListener)> = match registry.lock() {
                Ok(registry) => registry
                    .listeners
                    .iter()
                    .flat_map(|(key, list)| {
                        list.iter()
                            .map(move |(_, listener)| (key.clone(), Arc::clone(listener)))
                    })
                    .collect(),
                Err(_) => break,
            };
            drop(registry);
            for (key, listener) in targets {
                listener(&key);
            }
        }
    })
}

/// Handle to one registered listener. Dropping it unsubscribes.
pub struct TickSubscription {
    registry: Weak<Mutex<Registry>>,
    key: SessionKey,
    id: u64,
    active: bool,
}

impl TickSubscription {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Ok(mut registry) = registry.lock() else {
            return;
        };
        if let Some(list) = registry.listeners.get_mut(&self.key) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                registry.listeners.remove(&self.key);
            }
        }
        if registry.listeners.is_empty() {
            if let Some(timer) = registry.timer.take() {
                timer.abort();
                debug!("tick timer stopped");
            }
        }
    }
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
