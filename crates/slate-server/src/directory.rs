//! Room directory: the broker's view of the excluded persistence layer.
//!
//! Membership data (owner + member statuses) is owned by the HTTP/CRUD side
//! of the system; the broker only reads it, once per draw authorization and
//! once per membership push. The trait keeps that boundary explicit and lets
//! tests run against an in-process map. The broker never writes membership
//! through this trait.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use slate_proto::{MembershipStatus, RoomCode, RoomSnapshot, UserId};
use thiserror::Error;

/// Errors from directory lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The backing store could not be reached.
    #[error("room directory unavailable: {0}")]
    Unavailable(String),
}

/// Read access to room membership data.
///
/// Must be Clone (shared with the control plane), Send + Sync, and
/// synchronous — lookups are served from the owning layer's cache, not by
/// blocking I/O on the relay path.
pub trait RoomDirectory: Clone + Send + Sync + 'static {
    /// Look up a room's membership snapshot by code.
    ///
    /// `None` means the room does not exist (or was deleted); the broker
    /// treats draws into such rooms as unauthorized.
    fn find_room(&self, code: &RoomCode) -> Result<Option<RoomSnapshot>, DirectoryError>;
}

/// In-process directory backed by a shared map.
///
/// Stands in for the real persistence service in tests and single-process
/// deployments. Clones share the same underlying map. Uses
/// `lock().expect()` which will panic if the mutex is poisoned — acceptable
/// for an in-process store.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Mutex<HashMap<RoomCode, RoomSnapshot>>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a room snapshot.
    ///
    /// This is the seam the excluded HTTP layer (or a test) uses to publish
    /// membership state into the broker's view.
    #[allow(clippy::expect_used)]
    pub fn upsert_room(&self, room: RoomSnapshot) {
        self.inner.lock().expect("Mutex poisoned").insert(room.code.clone(), room);
    }

    /// Update one member's status in place.
    ///
    /// Returns `false` if the room or member is unknown, or the change would
    /// demote the owner.
    #[allow(clippy::expect_used)]
    pub fn set_member_status(
        &self,
        code: &RoomCode,
        user_id: &UserId,
        status: MembershipStatus,
    ) -> bool {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.get_mut(code).is_some_and(|room| room.set_status(user_id, status))
    }

    /// Number of rooms known to the directory.
    #[allow(clippy::expect_used)]
    pub fn room_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }
}

impl RoomDirectory for MemoryDirectory {
    #[allow(clippy::expect_used)]
    fn find_room(&self, code: &RoomCode) -> Result<Option<RoomSnapshot>, DirectoryError> {
        Ok(self.inner.lock().expect("Mutex poisoned").get(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use slate_proto::RoomMember;

    use super::*;

    fn room_code() -> RoomCode {
        RoomCode::parse("ABC123").unwrap()
    }

    #[test]
    fn find_room_round_trip() {
        let directory = MemoryDirectory::new();
        assert_eq!(directory.find_room(&room_code()).unwrap(), None);

        let room = RoomSnapshot::new(room_code(), UserId::from("u1"), "Owner");
        directory.upsert_room(room.clone());

        assert_eq!(directory.find_room(&room_code()).unwrap(), Some(room));
    }

    #[test]
    fn clones_share_state() {
        let directory = MemoryDirectory::new();
        let clone = directory.clone();

        directory.upsert_room(RoomSnapshot::new(room_code(), UserId::from("u1"), "Owner"));
        assert_eq!(clone.room_count(), 1);
    }

    #[test]
    fn set_member_status_updates_snapshot() {
        let directory = MemoryDirectory::new();
        let mut room = RoomSnapshot::new(room_code(), UserId::from("u1"), "Owner");
        room.upsert_member(RoomMember {
            user_id: UserId::from("u2"),
            display_name: "Guest".to_string(),
            status: MembershipStatus::Pending,
        });
        directory.upsert_room(room);

        assert!(directory.set_member_status(
            &room_code(),
            &UserId::from("u2"),
            MembershipStatus::Approved
        ));

        let room = directory.find_room(&room_code()).unwrap().unwrap();
        assert_eq!(
            room.member(&UserId::from("u2")).unwrap().status,
            MembershipStatus::Approved
        );
    }

    #[test]
    fn set_member_status_unknown_room_fails() {
        let directory = MemoryDirectory::new();
        assert!(!directory.set_member_status(
            &room_code(),
            &UserId::from("u2"),
            MembershipStatus::Approved
        ));
    }
}
