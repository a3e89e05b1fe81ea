//! Room event broadcaster: joins, leaves, chat and ephemeral room events.
//!
//! Joins, leaves and chat mutate the presence store, so they take the hub's
//! write lock and enqueue their notifications before releasing it. Reactions,
//! buzzes and hand updates touch no state and only need the read lock.

use tracing::{debug, info};
use watchparty_common::{
    new_id, now_millis, ChatMessage, ConnectionId, ServerEvent, UserProfile,
};

use crate::hub::{Hub, HubState};

impl HubState {
    /// Remove a connection from whatever room it is in and tell the rest of
    /// the room. Returns the room it left.
    pub(crate) fn leave_room_locked(&mut self, connection_id: &ConnectionId, now: i64) -> Option<String> {
        let room_id = match self
            .connections
            .get_mut(connection_id)
            .and_then(|entry| entry.room.take())
        {
            Some(room_id) => room_id,
            None => self.presence.room_of(connection_id)?.to_string(),
        };

        let removed = self.presence.leave(&room_id, connection_id, now)?;
        info!(
            room_id = %room_id,
            connection = %connection_id,
            nickname = %removed.nickname,
            "Participant left"
        );
        self.deliver_to_room(
            &room_id,
            &ServerEvent::UserLeft {
                connection_id: connection_id.clone(),
            },
            None,
        );
        Some(room_id)
    }
}

impl Hub {
    /// Put a connection into a room and send it the room's baseline.
    ///
    /// The joiner receives `room-users` (itself excluded) followed by
    /// `chat-history`; existing members receive `user-joined`.
    pub async fn join_room(&self, connection_id: &ConnectionId, room_id: &str, profile: UserProfile) {
        let now = now_millis();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if let Some(previous) = state.leave_room_locked(connection_id, now) {
            debug!(connection = %connection_id, previous = %previous, "Left previous room before join");
        }

        let outcome = state.presence.join(room_id, connection_id, &profile, now);

        for ghost in &outcome.evicted {
            if let Some(entry) = state.connections.get_mut(&ghost.connection_id) {
                entry.room = None;
            }
            state.deliver_to_room(
                room_id,
                &ServerEvent::UserLeft {
                    connection_id: ghost.connection_id.clone(),
                },
                Some(connection_id),
            );
        }

        if let Some(entry) = state.connections.get_mut(connection_id) {
            entry.room = Some(room_id.to_string());
        }

        let joined = state.deliver_to_room(
            room_id,
            &ServerEvent::UserJoined {
                connection_id: connection_id.clone(),
                user: profile.clone(),
            },
            Some(connection_id),
        );

        let users = state
            .presence
            .participants(room_id, Some(connection_id))
            .iter()
            .map(|p| p.peer_info())
            .collect();
        state.deliver(connection_id, ServerEvent::RoomUsers { users });
        state.deliver(
            connection_id,
            ServerEvent::ChatHistory {
                messages: state.presence.history(room_id),
            },
        );

        info!(
            room_id,
            connection = %connection_id,
            nickname = %profile.nickname,
            notified = joined,
            evicted = outcome.evicted.len(),
            "Participant joined"
        );
    }

    /// Leave the connection's current room. Returns false when it was in none.
    pub async fn leave_room(&self, connection_id: &ConnectionId) -> bool {
        let mut state = self.state.write().await;
        state.leave_room_locked(connection_id, now_millis()).is_some()
    }

    /// Leave any room and drop the connection from the registry.
    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        let mut state = self.state.write().await;
        state.leave_room_locked(connection_id, now_millis());
        if state.connections.remove(connection_id).is_some() {
            debug!(connection = %connection_id, "Connection unregistered");
        }
    }

    /// Store a chat message in the room history and deliver it to every
    /// member, the sender included.
    pub async fn broadcast_chat(
        &self,
        connection_id: &ConnectionId,
        room_id: &str,
        text: String,
        user: Option<UserProfile>,
    ) -> ChatMessage {
        let now = now_millis();
        let mut state = self.state.write().await;

        let user = user
            .or_else(|| {
                state
                    .presence
                    .participant(room_id, connection_id)
                    .map(|p| p.profile())
            })
            .unwrap_or_default();

        let message = ChatMessage {
            id: new_id(),
            sender_connection_id: connection_id.clone(),
            user,
            text,
            timestamp: now,
        };

        if state.presence.append_message(room_id, message.clone(), now) {
            let reached = state.deliver_to_room(
                room_id,
                &ServerEvent::ChatMessage {
                    message: message.clone(),
                },
                None,
            );
            debug!(room_id, connection = %connection_id, reached, "Chat message broadcast");
        }
        message
    }

    pub async fn broadcast_reaction(&self, connection_id: &ConnectionId, room_id: &str, emoji: String) -> usize {
        let event = ServerEvent::Reaction {
            sender_connection_id: connection_id.clone(),
            emoji,
            timestamp: now_millis(),
        };
        self.state.read().await.deliver_to_room(room_id, &event, None)
    }

    pub async fn broadcast_buzz(&self, connection_id: &ConnectionId, room_id: &str) -> usize {
        let event = ServerEvent::Buzz {
            sender_connection_id: connection_id.clone(),
            timestamp: now_millis(),
        };
        self.state.read().await.deliver_to_room(room_id, &event, None)
    }

    pub async fn broadcast_hand_toggle(&self, connection_id: &ConnectionId, room_id: &str, is_raised: bool) -> usize {
        let event = ServerEvent::HandUpdate {
            connection_id: connection_id.clone(),
            is_raised,
        };
        self.state.read().await.deliver_to_room(room_id, &event, None)
    }
}
