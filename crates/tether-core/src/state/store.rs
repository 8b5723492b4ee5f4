//! Aggregated per-session state store.
//!
//! The `AggregatedStateStore` owns one [`AggregatedState`] per session key.
//! Poll results, summaries, queue failures, and share links from every call
//! site are merged here; each mutation runs under the record's shard lock so
//! concurrent callers never observe a half-applied update.
//!
//! Synthetic events land in a bounded ring per key, shared by every observer
//! of that session.

use std::collections::VecDeque;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tether_types::session::SessionKey;
use tether_types::state::{AggregatedState, PartEntry, PollResult, SessionEvent};
use tether_types::summary::{SEND_FAILED, SummaryView};
use tracing::debug;

const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Concurrent map of session key to aggregated record.
#[derive(Debug)]
pub struct AggregatedStateStore {
    states: DashMap<SessionKey, AggregatedState>,
    events: DashMap<SessionKey, VecDeque<SessionEvent>>,
    event_capacity: usize,
}

impl Default for AggregatedStateStore {
    fn default() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl AggregatedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose per-session event ring holds at most `capacity` events.
    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            states: DashMap::new(),
            events: DashMap::new(),
            event_capacity: capacity.max(1),
        }
    }

    /// Return the record for `key`, creating a zero-valued one if absent.
    ///
    /// Fetching an existing record counts as a reconnect.
    pub fn get_or_create(&self, key: &SessionKey) -> AggregatedState {
        match self.states.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                state.reconnects += 1;
                debug!(key = %key, reconnects = state.reconnects, "observer reattached");
                state.clone()
            }
            Entry::Vacant(vacant) => vacant.insert(AggregatedState::new(key)).clone(),
        }
    }

    /// Merge a poll into the record for `key`.
    ///
    /// Returns the synthetic `session.message.update` event when the message
    /// count changed since the previous poll, after appending it to the
    /// session's event ring. The first poll of a record only establishes the
    /// baseline.
    pub fn apply_poll(&self, key: &SessionKey, poll: PollResult) -> Option<SessionEvent> {
        let event = self.merge_poll(key, poll)?;
        let mut ring = self.events.entry(key.clone()).or_default();
        while ring.len() >= self.event_capacity {
            ring.pop_front();
        }
        ring.push_back(event.clone());
        Some(event)
    }

    fn merge_poll(&self, key: &SessionKey, poll: PollResult) -> Option<SessionEvent> {
        let mut state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| AggregatedState::new(key));
        let now = Utc::now();

        let previous_count = state.message_count;
        let has_baseline = state.counts.upstream_events > 0;

        state.counts.upstream_events += 1;
        state.counts.total_events += 1;
        state.last_event_ts = now.timestamp_millis();

        // Display-window messages double as parts, keyed by absolute index.
        let first_index = poll.message_count.saturating_sub(poll.last_messages.len());
        for (offset, msg) in poll.last_messages.iter().enumerate() {
            let part_id = format!("m{}", first_index + offset);
            match state.parts.get_mut(&part_id) {
                Some(part) if part.text == msg.text => {}
                Some(part) => {
                    part.text = msg.text.clone();
                    part.updated_at = now;
                }
                None => {
                    state.parts.insert(
                        part_id,
                        PartEntry {
                            text: msg.text.clone(),
                            updated_at: now,
                        },
                    );
                }
            }
        }

        state.last_message = poll.last_messages.last().cloned();
        state.last_messages = poll.last_messages;
        state.message_count = poll.message_count;

        if !has_baseline || previous_count == poll.message_count {
            return None;
        }

        let event = SessionEvent::message_update(key, previous_count, poll.message_count);
        state.counts.synthetic_message_updates += 1;
        state.counts.total_events += 1;
        state.last_types.push(event.kind.clone());
        debug!(
            key = %key,
            previous = previous_count,
            current = poll.message_count,
            "message count changed"
        );
        Some(event)
    }

    /// Merge an evaluated summary into the record, if it exists.
    ///
    /// A send-failure placeholder stays until the outbound queue clears it.
    pub fn merge_summary(&self, key: &SessionKey, view: &SummaryView) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                if state.summary != SEND_FAILED {
                    state.summary = view.text.clone();
                    state.action_flag = view.action;
                }
                true
            }
            None => false,
        }
    }

    /// Overwrite the summary of an existing record. Returns whether it exists.
    pub fn set_summary(&self, key: &SessionKey, summary: &str, action: bool) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                state.summary = summary.to_string();
                state.action_flag = action;
                true
            }
            None => false,
        }
    }

    /// Replace the summary with `replacement` only while it equals `expected`.
    pub fn replace_summary_if(&self, key: &SessionKey, expected: &str, replacement: &str) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) if state.summary == expected => {
                state.summary = replacement.to_string();
                state.action_flag = false;
                true
            }
            _ => false,
        }
    }

    pub fn set_share_url(&self, key: &SessionKey, url: &str) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                state.share_url = Some(url.to_string());
                true
            }
            None => false,
        }
    }

    /// Record the latest text of a streamed part.
    pub fn record_part(&self, key: &SessionKey, part_id: &str, text: &str) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                state.parts.insert(
                    part_id.to_string(),
                    PartEntry {
                        text: text.to_string(),
                        updated_at: Utc::now(),
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Record an observed event type.
    pub fn record_type(&self, key: &SessionKey, kind: &str) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                state.last_types.push(kind.to_string());
                state.counts.total_events += 1;
                state.last_event_ts = Utc::now().timestamp_millis();
                true
            }
            None => false,
        }
    }

    /// Synthetic events of `key`, oldest first.
    pub fn recent_events(&self, key: &SessionKey) -> Vec<SessionEvent> {
        self.events
            .get(key)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self, key: &SessionKey) -> Option<AggregatedState> {
        self.states.get(key).map(|s| s.clone())
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.states.contains_key(key)
    }

    pub fn remove(&self, key: &SessionKey) -> Option<AggregatedState> {
        self.events.remove(key);
        self.states.remove(key).map(|(_, state)| state)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.states.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Bound the parts and types of one record. Returns whether it exists.
    pub fn prune(&self, key: &SessionKey, parts_limit: usize, types_limit: usize) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                prune_state(&mut state, parts_limit, types_limit);
                true
            }
            None => false,
        }
    }

    /// Prune every record. Returns the number of entries dropped.
    pub fn prune_all(&self, parts_limit: usize, types_limit: usize) -> usize {
        let mut dropped = 0;
        for mut entry in self.states.iter_mut() {
            dropped += prune_state(entry.value_mut(), parts_limit, types_limit);
        }
        if dropped > 0 {
            debug!(dropped, "pruned aggregated state");
        }
        dropped
    }
}

/// Keep the `parts_limit` most recently updated parts and the last
/// `types_limit` types. Returns how many entries were dropped.
pub fn prune_state(state: &mut AggregatedState, parts_limit: usize, types_limit: usize) -> usize {
    let mut dropped = 0;

    if state.parts.len() > parts_limit {
        let mut order: Vec<(String, chrono::DateTime<Utc>)> = state
            .parts
            .iter()
            .map(|(id, part)| (id.clone(), part.updated_at))
            .collect();
        // Newest first; ties broken by id so the result is deterministic.
        order.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (id, _) in order.into_iter().skip(parts_limit) {
            state.parts.remove(&id);
            dropped += 1;
        }
    }

    if state.last_types.len() > types_limit {
        let excess = state.last_types.len() - types_limit;
        state.last_types.drain(..excess);
        dropped += excess;
    }

    dropped
}
