//! Room channel manager: room-scoped broadcast group subscriptions.
//!
//! Maintains bidirectional mappings: room → sessions (for fan-out) and
//! session → rooms (for disconnect cleanup). Rooms are created implicitly on
//! first subscribe and garbage-collected when their subscriber set becomes
//! empty.
//!
//! One connection subscribing to multiple rooms is allowed — not needed in
//! practice (one whiteboard session per connection) but nothing here
//! prevents it.

use std::collections::{HashMap, HashSet};

use slate_proto::RoomCode;

/// Subscription manager for room-scoped broadcast groups.
#[derive(Debug, Default)]
pub struct RoomChannelManager {
    /// Room code → set of subscribed session IDs
    room_subscribers: HashMap<RoomCode, HashSet<u64>>,
    /// Session ID → set of subscribed room codes
    session_rooms: HashMap<u64, HashSet<RoomCode>>,
}

impl RoomChannelManager {
    /// Create a new empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a session to a room's broadcast group.
    ///
    /// Returns `true` if the session was not already subscribed.
    pub fn join(&mut self, session_id: u64, room: RoomCode) -> bool {
        let newly_in_room = self.room_subscribers.entry(room.clone()).or_default().insert(session_id);
        self.session_rooms.entry(session_id).or_default().insert(room);
        newly_in_room
    }

    /// Unsubscribe a session from a room's broadcast group.
    ///
    /// Returns `true` if the session was subscribed and is now unsubscribed.
    pub fn leave(&mut self, session_id: u64, room: &RoomCode) -> bool {
        let removed =
            self.room_subscribers.get_mut(room).is_some_and(|s| s.remove(&session_id));

        if self.room_subscribers.get(room).is_some_and(HashSet::is_empty) {
            self.room_subscribers.remove(room);
        }

        if let Some(rooms) = self.session_rooms.get_mut(&session_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.session_rooms.remove(&session_id);
            }
        }

        removed
    }

    /// Check if a session is subscribed to a room.
    pub fn is_subscribed(&self, session_id: u64, room: &RoomCode) -> bool {
        self.room_subscribers.get(room).is_some_and(|s| s.contains(&session_id))
    }

    /// All sessions subscribed to a room.
    pub fn sessions_in(&self, room: &RoomCode) -> impl Iterator<Item = u64> + '_ {
        self.room_subscribers.get(room).into_iter().flat_map(|s| s.iter().copied())
    }

    /// Remove a session from every room it is subscribed to.
    ///
    /// Returns the rooms it was in. Used for disconnect cleanup, which must
    /// run exactly once per connection.
    pub fn remove_session(&mut self, session_id: u64) -> Vec<RoomCode> {
        let rooms: Vec<RoomCode> =
            self.session_rooms.remove(&session_id).into_iter().flatten().collect();

        for room in &rooms {
            if let Some(subscribers) = self.room_subscribers.get_mut(room) {
                subscribers.remove(&session_id);
                if subscribers.is_empty() {
                    self.room_subscribers.remove(room);
                }
            }
        }

        rooms
    }

    /// Number of sessions subscribed to a room.
    pub fn subscriber_count(&self, room: &RoomCode) -> usize {
        self.room_subscribers.get(room).map_or(0, HashSet::len)
    }

    /// Number of rooms with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.room_subscribers.len()
    }
}
