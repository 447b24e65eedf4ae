//! Change broadcaster
//!
//! Publishes domain events to subscribed clients over a persistent
//! bidirectional channel (see [`ws`]).
//!
//! # Delivery model
//!
//! - At-least-once: clients deduplicate on `event_id`
//! - Per-topic monotonic `seq`; no cross-topic ordering
//! - Bounded replay buffer per topic; reconnecting clients supply their
//!   last seen `seq` and either replay or receive "resync required"
//! - Bounded per-client outbound queues; the slowest client is dropped
//!   with a `resync_required` close instead of blocking publishers
//!
//! Subscriber sets are copy-on-write so publication walks a snapshot
//! without holding a lock.
//!
//! The topic registry is a process-wide singleton with explicit [`init`]
//! and [`shutdown`] lifecycle calls.

pub mod ws;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::BroadcastConfig;

// ============================================================================
// Events
// ============================================================================

/// Domain event kinds carried on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    AssignmentCreated,
    AssignmentUpdated,
    AssignmentDeleted,
    AssignmentConfirmed,
    AssignmentDeclined,
    SchedulePublished,
    ScheduleArchived,
    NotificationCreated,
    PresenceTyping,
    PresenceEditing,
    PresenceIdle,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignmentCreated => "assignment.created",
            Self::AssignmentUpdated => "assignment.updated",
            Self::AssignmentDeleted => "assignment.deleted",
            Self::AssignmentConfirmed => "assignment.confirmed",
            Self::AssignmentDeclined => "assignment.declined",
            Self::SchedulePublished => "schedule.published",
            Self::ScheduleArchived => "schedule.archived",
            Self::NotificationCreated => "notification.created",
            Self::PresenceTyping => "presence.typing",
            Self::PresenceEditing => "presence.editing",
            Self::PresenceIdle => "presence.idle",
        }
    }
}

/// Wire envelope for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub topic: String,
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    pub ts: DateTime<Utc>,
}

/// Topic naming helpers
pub mod topics {
    use uuid::Uuid;

    pub fn schedule(id: Uuid) -> String {
        format!("schedule:{id}")
    }

    pub fn user(id: Uuid) -> String {
        format!("user:{id}")
    }

    pub const GLOBAL: &str = "global";
}

// ============================================================================
// Clients
// ============================================================================

/// Messages flowing to one connected client
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Event),
    /// Replay gap or queue overflow: the client must resync
    ResyncRequired { reason: String },
    Heartbeat,
}

/// A connected client's send handle
#[derive(Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    pub user_id: Uuid,
    sender: mpsc::Sender<Outbound>,
}

/// Outcome of a subscribe-with-replay request
pub enum Replay {
    /// Events since the supplied seq, in order
    Events(Vec<Event>),
    /// The requested seq fell out of the buffer
    ResyncRequired,
}

// ============================================================================
// Topic state
// ============================================================================

struct TopicState {
    seq: AtomicU64,
    buffer: RwLock<VecDeque<Event>>,
    /// Copy-on-write subscriber snapshot
    subscribers: RwLock<Arc<Vec<ClientHandle>>>,
}

impl TopicState {
    fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            buffer: RwLock::new(VecDeque::new()),
            subscribers: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

// ============================================================================
// Broadcaster
// ============================================================================

/// The topic registry and publication engine
pub struct Broadcaster {
    topics: DashMap<String, TopicState>,
    replay_buffer: usize,
    client_queue: usize,
    dropped_clients: AtomicU64,
}

impl Broadcaster {
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            topics: DashMap::new(),
            replay_buffer: config.replay_buffer,
            client_queue: config.client_queue,
            dropped_clients: AtomicU64::new(0),
        }
    }

    /// Register a client, returning its handle and the outbound receiver
    pub fn connect(&self, user_id: Uuid) -> (ClientHandle, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(self.client_queue);
        let handle = ClientHandle {
            id: Uuid::new_v4(),
            user_id,
            sender,
        };
        (handle, receiver)
    }

    /// Subscribe a client to a topic, replaying from `last_seq` when given
    pub fn subscribe(
        &self,
        client: &ClientHandle,
        topic: &str,
        last_seq: Option<u64>,
    ) -> Replay {
        let state = self.topics.entry(topic.to_string()).or_insert_with(TopicState::new);

        {
            let mut subs = state.subscribers.write();
            let mut next: Vec<ClientHandle> =
                subs.iter().filter(|c| c.id != client.id).cloned().collect();
            next.push(client.clone());
            *subs = Arc::new(next);
        }

        match last_seq {
            None => Replay::Events(Vec::new()),
            Some(seen) => {
                let buffer = state.buffer.read();
                let oldest = buffer.front().map(|e| e.seq);
                match oldest {
                    // Everything after `seen` is still buffered
                    _ if buffer.is_empty() && seen >= state.seq.load(Ordering::Relaxed) => {
                        Replay::Events(Vec::new())
                    }
                    Some(oldest_seq) if oldest_seq <= seen + 1 => Replay::Events(
                        buffer.iter().filter(|e| e.seq > seen).cloned().collect(),
                    ),
                    None if seen >= state.seq.load(Ordering::Relaxed) => {
                        Replay::Events(Vec::new())
                    }
                    _ => Replay::ResyncRequired,
                }
            }
        }
    }

    /// Remove a client from one topic
    pub fn unsubscribe(&self, client_id: Uuid, topic: &str) {
        if let Some(state) = self.topics.get(topic) {
            let mut subs = state.subscribers.write();
            let next: Vec<ClientHandle> =
                subs.iter().filter(|c| c.id != client_id).cloned().collect();
            *subs = Arc::new(next);
        }
    }

    /// Remove a client everywhere (disconnect cancels all subscriptions)
    pub fn disconnect(&self, client_id: Uuid) {
        for state in self.topics.iter() {
            let mut subs = state.subscribers.write();
            if subs.iter().any(|c| c.id == client_id) {
                let next: Vec<ClientHandle> =
                    subs.iter().filter(|c| c.id != client_id).cloned().collect();
                *subs = Arc::new(next);
            }
        }
    }

    /// Publish an event to a topic
    ///
    /// Returns the assigned seq. Clients with full queues are dropped with
    /// a resync notice rather than blocking.
    pub fn publish(&self, topic: &str, kind: EventKind, payload: serde_json::Value) -> u64 {
        let state = self.topics.entry(topic.to_string()).or_insert_with(TopicState::new);
        let seq = state.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let event = Event {
            event_id: Uuid::new_v4(),
            topic: topic.to_string(),
            seq,
            kind: kind.as_str().to_string(),
            payload,
            ts: Utc::now(),
        };

        {
            let mut buffer = state.buffer.write();
            buffer.push_back(event.clone());
            while buffer.len() > self.replay_buffer {
                buffer.pop_front();
            }
        }

        // Lock-free walk over the subscriber snapshot
        let snapshot = state.subscribers.read().clone();
        drop(state);

        let mut slow: Vec<Uuid> = Vec::new();
        for client in snapshot.iter() {
            if client.sender.try_send(Outbound::Event(event.clone())).is_err() {
                slow.push(client.id);
                let _ = client.sender.try_send(Outbound::ResyncRequired {
                    reason: "outbound queue overflow".to_string(),
                });
            }
        }
        for client_id in slow {
            self.dropped_clients.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(client_id = %client_id, topic = %topic, "Dropping slow client");
            self.disconnect(client_id);
        }

        seq
    }

    /// Current seq for a topic (0 when never published)
    pub fn current_seq(&self, topic: &str) -> u64 {
        self.topics
            .get(topic)
            .map(|s| s.seq.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total subscribers across topics (a client counts once per topic)
    pub fn subscription_count(&self) -> usize {
        self.topics
            .iter()
            .map(|s| s.subscribers.read().len())
            .sum()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_clients.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

lazy_static! {
    static ref BROADCASTER: RwLock<Option<Arc<Broadcaster>>> = RwLock::new(None);
}

/// Initialize the process-wide broadcaster
pub fn init(config: &BroadcastConfig) -> Arc<Broadcaster> {
    let broadcaster = Arc::new(Broadcaster::new(config));
    *BROADCASTER.write() = Some(broadcaster.clone());
    broadcaster
}

/// Handle to the process-wide broadcaster, if initialized
pub fn get() -> Option<Arc<Broadcaster>> {
    BROADCASTER.read().clone()
}

/// Tear down the process-wide broadcaster
pub fn shutdown() {
    if BROADCASTER.write().take().is_some() {
        tracing::info!("Broadcaster shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BroadcastConfig {
        BroadcastConfig {
            replay_buffer: 5,
            heartbeat_secs: 30,
            client_queue: 4,
        }
    }

    fn payload(n: u64) -> serde_json::Value {
        serde_json::json!({ "n": n })
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let b = Broadcaster::new(&config());
        let (client, mut rx) = b.connect(Uuid::new_v4());
        b.subscribe(&client, "schedule:x", None);

        let seq = b.publish("schedule:x", EventKind::AssignmentCreated, payload(1));
        assert_eq!(seq, 1);

        let Outbound::Event(event) = rx.recv().await.unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.seq, 1);
        assert_eq!(event.kind, "assignment.created");
        assert_eq!(event.topic, "schedule:x");
    }

    #[tokio::test]
    async fn test_seq_is_per_topic_monotonic() {
        let b = Broadcaster::new(&config());
        assert_eq!(b.publish("a", EventKind::AssignmentCreated, payload(1)), 1);
        assert_eq!(b.publish("a", EventKind::AssignmentUpdated, payload(2)), 2);
        assert_eq!(b.publish("b", EventKind::AssignmentCreated, payload(3)), 1);
    }

    #[tokio::test]
    async fn test_replay_from_last_seq() {
        let b = Broadcaster::new(&config());
        for i in 0..4 {
            b.publish("t", EventKind::AssignmentCreated, payload(i));
        }

        let (client, _rx) = b.connect(Uuid::new_v4());
        let Replay::Events(events) = b.subscribe(&client, "t", Some(2)) else {
            panic!("expected replay");
        };
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 3);
        assert_eq!(events[1].seq, 4);
    }

    #[tokio::test]
    async fn test_replay_gap_requires_resync() {
        let b = Broadcaster::new(&config());
        // Buffer cap is 5; publish 8 so seqs 1-3 fall out
        for i in 0..8 {
            b.publish("t", EventKind::AssignmentCreated, payload(i));
        }

        let (client, _rx) = b.connect(Uuid::new_v4());
        assert!(matches!(
            b.subscribe(&client, "t", Some(1)),
            Replay::ResyncRequired
        ));
        // seq 3 is the newest evicted one; 4..8 replayable from seq 3
        assert!(matches!(
            b.subscribe(&client, "t", Some(3)),
            Replay::Events(events) if events.len() == 5
        ));
    }

    #[tokio::test]
    async fn test_slow_client_dropped_not_blocking() {
        let b = Broadcaster::new(&config());
        let (slow, _rx_kept_unread) = b.connect(Uuid::new_v4());
        b.subscribe(&slow, "t", None);

        // Queue capacity is 4; the 5th publish overflows and drops the client
        for i in 0..6 {
            b.publish("t", EventKind::AssignmentCreated, payload(i));
        }

        assert_eq!(b.dropped_count(), 1);
        assert_eq!(b.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_all_subscriptions() {
        let b = Broadcaster::new(&config());
        let (client, _rx) = b.connect(Uuid::new_v4());
        b.subscribe(&client, "a", None);
        b.subscribe(&client, "b", None);
        assert_eq!(b.subscription_count(), 2);

        b.disconnect(client.id);
        assert_eq!(b.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_does_not_duplicate() {
        let b = Broadcaster::new(&config());
        let (client, mut rx) = b.connect(Uuid::new_v4());
        b.subscribe(&client, "t", None);
        b.subscribe(&client, "t", None);

        b.publish("t", EventKind::AssignmentCreated, payload(1));
        assert!(matches!(rx.recv().await, Some(Outbound::Event(_))));
        assert!(rx.try_recv().is_err());
    }
}
