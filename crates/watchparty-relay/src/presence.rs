//! Presence store: per-room membership, bounded chat history, idle expiry.
//!
//! The store is a plain owned value with no interior locking; the hub holds
//! it behind its lock. Every mutating call takes `now` (Unix millis) so
//! expiry is deterministic.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::{debug, info};
use watchparty_common::{ChatMessage, ConnectionId, PeerInfo, UserProfile};

/// A member of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub nickname: String,
    pub avatar: String,
    pub joined_at: i64,
}

impl Participant {
    pub fn profile(&self) -> UserProfile {
        UserProfile::new(self.nickname.clone(), self.avatar.clone())
    }

    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            connection_id: self.connection_id.clone(),
            user: self.profile(),
        }
    }
}

/// A named group sharing chat, presence and signaling.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub participants: HashMap<ConnectionId, Participant>,
    pub history: VecDeque<ChatMessage>,
    pub last_activity: i64,
}

impl Room {
    fn new(id: &str, now: i64) -> Self {
        Self {
            id: id.to_string(),
            participants: HashMap::new(),
            history: VecDeque::new(),
            last_activity: now,
        }
    }
}

/// Result of a join: the new participant plus any ghosts it displaced.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub participant: Participant,
    pub evicted: Vec<Participant>,
}

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub history_capacity: usize,
    pub room_ttl: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            room_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// All rooms known to the relay, keyed by room id.
#[derive(Debug, Default)]
pub struct PresenceStore {
    config: PresenceConfig,
    rooms: HashMap<String, Room>,
}

impl PresenceStore {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
        }
    }

    /// Add a participant, creating the room on first use.
    ///
    /// Any other participant with the same nickname is treated as a ghost of
    /// a reconnecting client and evicted first. Nickname equality is only a
    /// heuristic: two different people choosing the same name evict each other.
    pub fn join(
        &mut self,
        room_id: &str,
        connection_id: &ConnectionId,
        profile: &UserProfile,
        now: i64,
    ) -> JoinOutcome {
        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id, now));

        let ghost_ids: Vec<ConnectionId> = room
            .participants
            .values()
            .filter(|p| p.nickname == profile.nickname && &p.connection_id != connection_id)
            .map(|p| p.connection_id.clone())
            .collect();

        let evicted: Vec<Participant> = ghost_ids
            .iter()
            .filter_map(|id| room.participants.remove(id))
            .collect();
        for ghost in &evicted {
            info!(
                room_id,
                nickname = %ghost.nickname,
                ghost = %ghost.connection_id,
                "Evicting ghost participant"
            );
        }

        let participant = Participant {
            connection_id: connection_id.clone(),
            nickname: profile.nickname.clone(),
            avatar: profile.avatar.clone(),
            joined_at: now,
        };
        room.participants
            .insert(connection_id.clone(), participant.clone());
        room.last_activity = now;

        JoinOutcome {
            participant,
            evicted,
        }
    }

    /// Remove a participant. The room and its history stay behind.
    pub fn leave(
        &mut self,
        room_id: &str,
        connection_id: &ConnectionId,
        now: i64,
    ) -> Option<Participant> {
        let room = self.rooms.get_mut(room_id)?;
        let removed = room.participants.remove(connection_id)?;
        room.last_activity = now;
        Some(removed)
    }

    /// Members of a room, optionally without one connection (usually "self").
    pub fn participants(
        &self,
        room_id: &str,
        exclude: Option<&ConnectionId>,
    ) -> Vec<Participant> {
        match self.rooms.get(room_id) {
            Some(room) => room
                .participants
                .values()
                .filter(|p| Some(&p.connection_id) != exclude)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn participant(&self, room_id: &str, connection_id: &ConnectionId) -> Option<&Participant> {
        self.rooms.get(room_id)?.participants.get(connection_id)
    }

    /// Append to a room's history, dropping the oldest entry when full.
    /// Returns false (and stores nothing) for a room nobody has joined.
    pub fn append_message(&mut self, room_id: &str, message: ChatMessage, now: i64) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            debug!(room_id, "Chat for unknown room not stored");
            return false;
        };
        room.history.push_back(message);
        while room.history.len() > self.config.history_capacity {
            room.history.pop_front();
        }
        room.last_activity = now;
        true
    }

    /// Chat history of a room in arrival order.
    pub fn history(&self, room_id: &str) -> Vec<ChatMessage> {
        match self.rooms.get(room_id) {
            Some(room) => room.history.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Delete empty rooms idle for longer than the TTL. Returns the reaped ids.
    pub fn reap_idle_rooms(&mut self, now: i64) -> Vec<String> {
        let ttl_ms = i64::try_from(self.config.room_ttl.as_millis()).unwrap_or(i64::MAX);
        let mut reaped = Vec::new();
        self.rooms.retain(|id, room| {
            let stale = room.participants.is_empty()
                && now.saturating_sub(room.last_activity) > ttl_ms;
            if stale {
                info!(room_id = %id, "Reaping idle room");
                reaped.push(id.clone());
            }
            !stale
        });
        reaped
    }

    /// Which room a connection is in, if any.
    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&str> {
        self.rooms
            .values()
            .find(|room| room.participants.contains_key(connection_id))
            .map(|room| room.id.as_str())
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn participant_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|room| room.participants.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 60 * 60 * 1000;

    fn profile(nickname: &str) -> UserProfile {
        UserProfile::new(nickname, "🐶")
    }

    fn message(n: usize) -> ChatMessage {
        ChatMessage {
            id: format!("m{n}"),
            sender_connection_id: ConnectionId::from("a"),
            user: profile("Al"),
            text: format!("message {n}"),
            timestamp: n as i64,
        }
    }

    #[test]
    fn join_creates_room_lazily() {
        let mut store = PresenceStore::default();
        assert_eq!(store.room_count(), 0);

        let outcome = store.join("R1", &ConnectionId::from("a"), &profile("Al"), 10);
        assert_eq!(outcome.participant.nickname, "Al");
        assert_eq!(outcome.participant.joined_at, 10);
        assert!(outcome.evicted.is_empty());
        assert_eq!(store.room_count(), 1);
        assert_eq!(store.participant_count("R1"), 1);
        assert!(store.history("R1").is_empty());
    }

    #[test]
    fn same_nickname_evicts_ghost() {
        let mut store = PresenceStore::default();
        let old = ConnectionId::from("old");
        let new = ConnectionId::from("new");
        store.join("R1", &old, &profile("Al"), 1);
        store.join("R1", &ConnectionId::from("b"), &profile("Bo"), 2);

        let outcome = store.join("R1", &new, &profile("Al"), 3);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].connection_id, old);
        assert_eq!(store.participant_count("R1"), 2);
        assert!(store.participant("R1", &old).is_none());
        assert!(store.participant("R1", &new).is_some());
    }

    #[test]
    fn empty_nicknames_also_collide() {
        let mut store = PresenceStore::default();
        store.join("R1", &ConnectionId::from("a"), &profile(""), 1);
        let outcome = store.join("R1", &ConnectionId::from("b"), &profile(""), 2);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(store.participant_count("R1"), 1);
    }

    #[test]
    fn rejoin_with_same_connection_is_not_a_ghost() {
        let mut store = PresenceStore::default();
        let a = ConnectionId::from("a");
        store.join("R1", &a, &profile("Al"), 1);
        let outcome = store.join("R1", &a, &profile("Al"), 2);
        assert!(outcome.evicted.is_empty());
        assert_eq!(store.participant_count("R1"), 1);
    }

    #[test]
    fn leave_keeps_room_and_history() {
        let mut store = PresenceStore::default();
        let a = ConnectionId::from("a");
        store.join("R1", &a, &profile("Al"), 1);
        assert!(store.append_message("R1", message(1), 2));

        let left = store.leave("R1", &a, 3).unwrap();
        assert_eq!(left.connection_id, a);
        assert_eq!(store.participant_count("R1"), 0);
        assert_eq!(store.room_count(), 1);
        assert_eq!(store.history("R1").len(), 1);
    }

    #[test]
    fn second_leave_is_a_no_op() {
        let mut store = PresenceStore::default();
        let a = ConnectionId::from("a");
        store.join("R1", &a, &profile("Al"), 1);
        store.join("R1", &ConnectionId::from("b"), &profile("Bo"), 1);
        assert!(store.leave("R1", &a, 2).is_some());
        assert!(store.leave("R1", &a, 3).is_none());
        assert_eq!(store.participant_count("R1"), 1);
        assert_eq!(store.room("R1").unwrap().last_activity, 2);
    }

    #[test]
    fn participant_count_tracks_joins_minus_leaves() {
        let mut store = PresenceStore::default();
        let ids: Vec<ConnectionId> = (0..5).map(|i| ConnectionId::from(format!("c{i}"))).collect();
        for (i, id) in ids.iter().enumerate() {
            store.join("R1", id, &profile(&format!("user{i}")), 1);
        }
        store.leave("R1", &ids[1], 2);
        store.leave("R1", &ids[3], 2);
        store.leave("R1", &ConnectionId::from("never-joined"), 2);
        assert_eq!(store.participant_count("R1"), 3);
    }

    #[test]
    fn participants_can_exclude_self() {
        let mut store = PresenceStore::default();
        let a = ConnectionId::from("a");
        let b = ConnectionId::from("b");
        store.join("R1", &a, &profile("Al"), 1);
        store.join("R1", &b, &profile("Bo"), 1);

        let others = store.participants("R1", Some(&b));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].connection_id, a);
        assert_eq!(store.participants("R1", None).len(), 2);
    }

    #[test]
    fn unknown_room_reads_are_empty() {
        let store = PresenceStore::default();
        assert!(store.participants("nope", None).is_empty());
        assert!(store.history("nope").is_empty());
        assert_eq!(store.participant_count("nope"), 0);
    }

    #[test]
    fn append_to_unknown_room_is_dropped() {
        let mut store = PresenceStore::default();
        assert!(!store.append_message("nope", message(1), 1));
        assert_eq!(store.room_count(), 0);
    }

    #[test]
    fn history_keeps_newest_fifty_in_order() {
        let mut store = PresenceStore::default();
        store.join("R1", &ConnectionId::from("a"), &profile("Al"), 0);
        for n in 1..=51 {
            store.append_message("R1", message(n), n as i64);
        }

        let history = store.history("R1");
        assert_eq!(history.len(), 50);
        assert_eq!(history.first().unwrap().id, "m2");
        assert_eq!(history.last().unwrap().id, "m51");
        assert!(history.iter().all(|m| m.id != "m1"));
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn history_capacity_is_configurable() {
        let mut store = PresenceStore::new(PresenceConfig {
            history_capacity: 3,
            ..PresenceConfig::default()
        });
        store.join("R1", &ConnectionId::from("a"), &profile("Al"), 0);
        for n in 1..=5 {
            store.append_message("R1", message(n), n as i64);
        }
        let ids: Vec<String> = store.history("R1").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m3", "m4", "m5"]);
    }

    #[test]
    fn reaper_deletes_empty_room_idle_past_ttl() {
        let mut store = PresenceStore::default();
        let a = ConnectionId::from("a");
        store.join("R1", &a, &profile("Al"), 0);
        store.leave("R1", &a, 0);

        let reaped = store.reap_idle_rooms(25 * HOUR);
        assert_eq!(reaped, vec!["R1".to_string()]);
        assert_eq!(store.room_count(), 0);
    }

    #[test]
    fn reaper_keeps_recently_idle_room() {
        let mut store = PresenceStore::default();
        let a = ConnectionId::from("a");
        store.join("R1", &a, &profile("Al"), 0);
        store.leave("R1", &a, 0);

        assert!(store.reap_idle_rooms(23 * HOUR).is_empty());
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn reaper_keeps_occupied_room_regardless_of_age() {
        let mut store = PresenceStore::default();
        store.join("R1", &ConnectionId::from("a"), &profile("Al"), 0);
        assert!(store.reap_idle_rooms(100 * HOUR).is_empty());
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn room_of_finds_membership() {
        let mut store = PresenceStore::default();
        let a = ConnectionId::from("a");
        store.join("R2", &a, &profile("Al"), 0);
        assert_eq!(store.room_of(&a), Some("R2"));
        assert_eq!(store.room_of(&ConnectionId::from("x")), None);
    }
}
