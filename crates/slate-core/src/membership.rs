//! Membership gate.
//!
//! The authorization predicate for drawing: evaluated server-side on every
//! inbound draw, because the client's own UI gate is not trustworthy. Pure
//! function over already-loaded membership data; fetching the snapshot is
//! the caller's job.

use slate_proto::{MembershipStatus, RoomSnapshot, UserId};

/// Whether `user_id` may submit drawing operations into `room`.
///
/// True iff the user is the room owner or an approved member. Anything else
/// (pending, rejected, unknown) may watch but not draw.
pub fn can_draw(user_id: &UserId, room: &RoomSnapshot) -> bool {
    if user_id == &room.owner {
        return true;
    }

    room.member(user_id).is_some_and(|m| m.status == MembershipStatus::Approved)
}

#[cfg(test)]
mod tests {
    use slate_proto::{RoomCode, RoomMember};

    use super::*;

    fn room_with(status: MembershipStatus) -> RoomSnapshot {
        let mut room = RoomSnapshot::new(
            RoomCode::parse("ABC123").expect("valid code"),
            UserId::from("owner"),
            "Owner",
        );
        room.upsert_member(RoomMember {
            user_id: UserId::from("guest"),
            display_name: "Guest".to_string(),
            status,
        });
        room
    }

    #[test]
    fn owner_can_always_draw() {
        let room = room_with(MembershipStatus::Pending);
        assert!(can_draw(&UserId::from("owner"), &room));
    }

    #[test]
    fn approved_member_can_draw() {
        let room = room_with(MembershipStatus::Approved);
        assert!(can_draw(&UserId::from("guest"), &room));
    }

    #[test]
    fn pending_member_cannot_draw() {
        let room = room_with(MembershipStatus::Pending);
        assert!(!can_draw(&UserId::from("guest"), &room));
    }

    #[test]
    fn rejected_member_cannot_draw() {
        let room = room_with(MembershipStatus::Rejected);
        assert!(!can_draw(&UserId::from("guest"), &room));
    }

    #[test]
    fn unknown_user_cannot_draw() {
        let room = room_with(MembershipStatus::Approved);
        assert!(!can_draw(&UserId::from("stranger"), &room));
    }
}
