//! Connection hub: the connection registry and the presence store under one lock.
//!
//! Every live WebSocket has an entry here holding its outbound queue and the
//! room it is in. Room state and delivery happen under the same lock, so an
//! event is enqueued for a room's members in the order the room saw it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use watchparty_common::{now_millis, ChatMessage, ConnectionId, ServerEvent};
use watchparty_config::WatchPartyConfig;

use crate::presence::{Participant, PresenceConfig, PresenceStore};

/// Sending half of one connection's outbound queue.
pub type Outbox = mpsc::Sender<ServerEvent>;

pub(crate) struct ConnectionEntry {
    pub(crate) outbox: Outbox,
    pub(crate) room: Option<String>,
}

pub(crate) struct HubState {
    pub(crate) presence: PresenceStore,
    pub(crate) connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl HubState {
    /// Enqueue an event for one connection without waiting.
    ///
    /// A full queue drops the event; a missing or closed connection is ignored.
    pub(crate) fn deliver(&self, target: &ConnectionId, event: ServerEvent) -> bool {
        let Some(entry) = self.connections.get(target) else {
            return false;
        };
        match entry.outbox.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %target, "Outbound queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %target, "Outbound queue closed");
                false
            }
        }
    }

    /// Enqueue an event for every current member of a room. Returns how many
    /// members it reached.
    pub(crate) fn deliver_to_room(
        &self,
        room_id: &str,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        self.presence
            .participants(room_id, exclude)
            .iter()
            .filter(|p| self.deliver(&p.connection_id, event.clone()))
            .count()
    }
}

/// Shared relay state, cheap to clone into every connection task.
#[derive(Clone)]
pub struct Hub {
    pub(crate) state: Arc<RwLock<HubState>>,
    outbound_queue: usize,
}

impl Hub {
    pub fn new(presence: PresenceConfig, outbound_queue: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState {
                presence: PresenceStore::new(presence),
                connections: HashMap::new(),
            })),
            outbound_queue: outbound_queue.max(1),
        }
    }

    pub fn from_config(config: &WatchPartyConfig) -> Self {
        Self::new(
            PresenceConfig {
                history_capacity: config.rooms.history_capacity as usize,
                room_ttl: config.rooms.idle_ttl(),
            },
            config.connection.outbound_queue as usize,
        )
    }

    /// Register a new connection and queue its `welcome` frame.
    pub async fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.outbound_queue);
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                outbox: tx,
                room: None,
            },
        );
        state.deliver(
            &connection_id,
            ServerEvent::Welcome {
                connection_id: connection_id.clone(),
            },
        );
        (connection_id, rx)
    }

    /// Queue an event for a single connection.
    pub async fn send_to(&self, target: &ConnectionId, event: ServerEvent) -> bool {
        self.state.read().await.deliver(target, event)
    }

    pub async fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.state.read().await.connections.contains_key(connection_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.presence.room_count()
    }

    pub async fn participants(&self, room_id: &str) -> Vec<Participant> {
        self.state.read().await.presence.participants(room_id, None)
    }

    pub async fn history(&self, room_id: &str) -> Vec<ChatMessage> {
        self.state.read().await.presence.history(room_id)
    }

    /// Liveness report for operational tooling.
    pub async fn health(&self) -> ServerEvent {
        let state = self.state.read().await;
        ServerEvent::Health {
            status: "ok".into(),
            connections: state.connections.len(),
            rooms: state.presence.room_count(),
        }
    }

    pub async fn reap_idle_rooms(&self) -> Vec<String> {
        self.reap_idle_rooms_at(now_millis()).await
    }

    pub(crate) async fn reap_idle_rooms_at(&self, now: i64) -> Vec<String> {
        self.state.write().await.presence.reap_idle_rooms(now)
    }

    /// Spawn the periodic idle-room reaper.
    pub fn spawn_reaper(&self, interval: Duration) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reaped = hub.reap_idle_rooms().await;
                if !reaped.is_empty() {
                    info!(count = reaped.len(), rooms = ?reaped, "Reaped idle rooms");
                }
                let rooms = hub.room_count().await;
                let connections = hub.connection_count().await;
                debug!(rooms, connections, "Reaper tick");
            }
        })
    }
}
