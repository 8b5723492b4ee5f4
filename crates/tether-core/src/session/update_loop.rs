//! Per-observer update loop.
//!
//! Each cycle polls the remote session, feeds the display window into the
//! aggregated store and the fingerprint window into the summary cache, and
//! emits a snapshot. Cycles run once on attach and then on every shared
//! tick until the observer goes away.

use std::sync::Arc;

use tether_types::message::{RecentMessage, tail};
use tether_types::session::SessionKey;
use tether_types::state::{AggregatedState, PollResult, SessionEvent, SessionSnapshot};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hub::SessionHub;
use crate::tick::TickListener;

pub struct UpdateLoop {
    hub: Arc<SessionHub>,
    key: SessionKey,
}

impl UpdateLoop {
    pub fn new(hub: Arc<SessionHub>, key: SessionKey) -> Self {
        Self { hub, key }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Synthetic events of this session, oldest first. Every observer of
    /// the session sees the same ring.
    pub fn recent_events(&self) -> Vec<SessionEvent> {
        self.hub.states().recent_events(&self.key)
    }

    /// Run one poll/merge/evaluate cycle and return the resulting snapshot.
    pub async fn cycle(&mut self) -> SessionSnapshot {
        let stream = &self.hub.config().stream;
        let endpoint = self.hub.endpoint_for(&self.key);

        let remote = match self
            .hub
            .backend()
            .list_messages(&endpoint, self.key.session_id())
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to list messages");
                Vec::new()
            }
        };

        let messages: Vec<RecentMessage> = remote
            .iter()
            .map(|m| RecentMessage::from_remote(m, Some(stream.max_message_chars)))
            .collect();
        let window = tail(&messages, self.hub.config().summary.window_size);
        let poll = PollResult {
            last_messages: tail(&messages, stream.display_window).to_vec(),
            message_count: messages.len(),
        };

        let states = Arc::clone(self.hub.states());
        states.apply_poll(&self.key, poll);

        let view = self.hub.cache().evaluate(&self.key, window);
        states.merge_summary(&self.key, &view);

        let state = states
            .snapshot(&self.key)
            .unwrap_or_else(|| AggregatedState::new(&self.key));
        SessionSnapshot {
            state,
            recent_events: states.recent_events(&self.key),
        }
    }

    /// Emit a snapshot now and on every tick until `cancel` fires or `tx`
    /// is closed.
    pub async fn run(mut self, cancel: CancellationToken, tx: mpsc::Sender<SessionSnapshot>) {
        let wake = Arc::new(Notify::new());
        let listener: TickListener = {
            let wake = Arc::clone(&wake);
            Arc::new(move |_key: &SessionKey| wake.notify_one())
        };
        let _subscription = self.hub.ticker().subscribe(&self.key, listener);
        let reconnects = self.hub.states().get_or_create(&self.key).reconnects;
        info!(key = %self.key, reconnects, "observer attached");

        loop {
            let snapshot = tokio::select! {
                _ = cancel.cancelled() => break,
                snapshot = self.cycle() => snapshot,
            };

            let sent = tokio::select! {
                _ = cancel.cancelled() => break,
                result = tx.send(snapshot) => result.is_ok(),
            };
            if !sent {
                debug!(key = %self.key, "observer channel closed");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = wake.notified() => {}
            }
        }

        info!(key = %self.key, "observer detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tether_types::message::RemoteMessage;
    use tether_types::state::MESSAGE_UPDATE_EVENT;
    use tether_types::summary::{NO_RECENT_MESSAGES, SEND_FAILED, SUMMARY_PENDING};

    use crate::remote::BoxChatBackend;
    use crate::test_support::{FakeBackend, PlainHasher, fast_config};

    fn hub_with(backend: &FakeBackend, configure: impl FnOnce(&mut tether_types::config::TetherConfig)) -> Arc<SessionHub> {
        let mut config = fast_config();
        configure(&mut config);
        SessionHub::new(
            config,
            BoxChatBackend::new(backend.clone()),
            Arc::new(PlainHasher),
            None,
        )
    }

    fn key() -> SessionKey {
        SessionKey::new("10.0.0.1", "s1")
    }

    fn messages(n: usize) -> Vec<RemoteMessage> {
        (0..n).map(|i| RemoteMessage::new("user", format!("m{i}"))).collect()
    }

    #[tokio::test]
    async fn test_cycle_windows_and_summary_reuse() {
        let backend = FakeBackend::new();
        backend.set_messages("s1", messages(12));
        let hub = hub_with(&backend, |_| {});
        let mut update_loop = UpdateLoop::new(Arc::clone(&hub), key());

        let first = update_loop.cycle().await;
        assert_eq!(first.state.message_count, 12);
        assert_eq!(first.state.last_messages.len(), 10);
        assert_eq!(first.state.last_messages[0].text, "m2");
        assert_eq!(first.state.summary, SUMMARY_PENDING);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = update_loop.cycle().await;
        assert_eq!(second.state.summary, "summary #1: m11");
        assert_eq!(backend.summarize_calls(), 1);
    }

    #[tokio::test]
    async fn test_truncates_long_messages() {
        let backend = FakeBackend::new();
        backend.set_messages("s1", vec![RemoteMessage::new("assistant", "x".repeat(50))]);
        let hub = hub_with(&backend, |c| c.stream.max_message_chars = 8);

        let snapshot = UpdateLoop::new(hub, key()).cycle().await;
        assert_eq!(snapshot.state.last_messages[0].text, "xxxxxxxx");
    }

    #[tokio::test]
    async fn test_list_failure_degrades_to_empty() {
        let backend = FakeBackend::new();
        backend.set_fail_list(true);
        let hub = hub_with(&backend, |_| {});

        let snapshot = UpdateLoop::new(hub, key()).cycle().await;
        assert_eq!(snapshot.state.message_count, 0);
        assert_eq!(snapshot.state.summary, NO_RECENT_MESSAGES);
        assert!(!snapshot.state.action_flag);
    }

    #[tokio::test]
    async fn test_event_ring_is_bounded() {
        let backend = FakeBackend::new();
        let hub = hub_with(&backend, |c| c.stream.event_ring_capacity = 2);
        let mut update_loop = UpdateLoop::new(hub, key());

        for n in 1..=5 {
            backend.set_messages("s1", messages(n));
            update_loop.cycle().await;
        }
        // First cycle is the baseline, the next four each emit an event
        let events = update_loop.recent_events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == MESSAGE_UPDATE_EVENT));
        assert_eq!(events.last().unwrap().payload["messageCount"], 5);
    }

    #[tokio::test]
    async fn test_every_observer_sees_message_update() {
        let backend = FakeBackend::new();
        backend.set_messages("s1", messages(1));
        let hub = hub_with(&backend, |_| {});
        let mut first = UpdateLoop::new(Arc::clone(&hub), key());
        let mut second = UpdateLoop::new(Arc::clone(&hub), key());

        first.cycle().await;
        second.cycle().await;
        backend.set_messages("s1", messages(2));
        let a = first.cycle().await;
        let b = second.cycle().await;

        assert_eq!(a.recent_events.len(), 1);
        assert_eq!(b.recent_events.len(), 1);
        assert_eq!(b.recent_events[0].kind, MESSAGE_UPDATE_EVENT);
        assert_eq!(b.recent_events[0].payload["messageCount"], 2);
        assert_eq!(hub.snapshot(&key()).unwrap().counts.synthetic_message_updates, 1);
    }

    #[tokio::test]
    async fn test_send_failure_survives_cycles() {
        let backend = FakeBackend::new();
        backend.set_messages("s1", messages(1));
        let hub = hub_with(&backend, |_| {});
        let mut update_loop = UpdateLoop::new(Arc::clone(&hub), key());

        update_loop.cycle().await;
        hub.states().set_summary(&key(), SEND_FAILED, false);
        let snapshot = update_loop.cycle().await;
        assert_eq!(snapshot.state.summary, SEND_FAILED);
    }

    #[tokio::test]
    async fn test_observe_streams_until_cancelled() {
        let backend = FakeBackend::new();
        backend.set_messages("s1", messages(3));
        let hub = hub_with(&backend, |_| {});
        let cancel = CancellationToken::new();

        let mut rx = hub.observe(key(), cancel.clone());
        let first = rx.recv().await.unwrap();
        assert_eq!(first.state.message_count, 3);
        assert_eq!(hub.ticker().subscriber_count(), 1);

        // Next snapshot arrives on a tick
        let second = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.state.meta.session_id, "s1");

        cancel.cancel();
        while rx.recv().await.is_some() {}
        assert_eq!(hub.ticker().subscriber_count(), 0);
        assert!(!hub.ticker().is_running());
    }

    #[tokio::test]
    async fn test_cancelling_observer_keeps_debounce_alive() {
        let backend = FakeBackend::new();
        backend.set_messages("s1", messages(2));
        let hub = hub_with(&backend, |_| {});
        let cancel = CancellationToken::new();

        let mut rx = hub.observe(key(), cancel.clone());
        rx.recv().await.unwrap();
        cancel.cancel();
        while rx.recv().await.is_some() {}

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.summarize_calls(), 1);
        assert!(hub.cache().entry(&key()).is_some());
    }

    #[tokio::test]
    async fn test_second_observer_counts_reconnect() {
        let backend = FakeBackend::new();
        let hub = hub_with(&backend, |_| {});
        let cancel = CancellationToken::new();

        let mut a = hub.observe(key(), cancel.clone());
        a.recv().await.unwrap();
        let mut b = hub.observe(key(), cancel.clone());
        b.recv().await.unwrap();

        assert_eq!(hub.snapshot(&key()).unwrap().reconnects, 1);
        assert_eq!(hub.ticker().subscriber_count(), 2);
        cancel.cancel();
    }
}
