//! Property-based tests for the connection registry and channel manager.
//!
//! Invariants that must hold for all interleavings of connects, joins, and
//! disconnects.

use std::collections::HashMap;

use proptest::prelude::*;
use slate_proto::{RoomCode, UserId};
use slate_server::{ConnectionRegistry, RoomChannelManager};

fn user(n: u8) -> UserId {
    UserId::from(format!("user-{n}").as_str())
}

fn room(n: u8) -> RoomCode {
    RoomCode::parse(&format!("ROOM{n}")).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: after any register sequence, lookup returns the session
    /// from the most recent register for each identity (last-write-wins).
    #[test]
    fn prop_registry_is_last_write_wins(
        registrations in proptest::collection::vec((0u8..8, 1u64..16), 1..64)
    ) {
        let mut registry = ConnectionRegistry::new();
        let mut expected: HashMap<u8, u64> = HashMap::new();

        for (u, session) in registrations {
            registry.register(user(u), session);
            expected.insert(u, session);
        }

        for (u, session) in expected {
            prop_assert_eq!(registry.lookup(&user(u)), Some(session));
        }
    }

    /// Property: a superseded session disconnecting never unregisters the
    /// identity's current session.
    #[test]
    fn prop_superseded_disconnect_is_harmless(
        registrations in proptest::collection::vec((0u8..4, 1u64..8), 1..32),
        disconnect in 1u64..8,
    ) {
        let mut registry = ConnectionRegistry::new();
        let mut expected: HashMap<u8, u64> = HashMap::new();

        for (u, session) in registrations {
            registry.register(user(u), session);
            expected.insert(u, session);
        }

        registry.remove_by_session(disconnect);

        for (u, session) in expected {
            if session == disconnect {
                prop_assert_eq!(registry.lookup(&user(u)), None);
            } else {
                prop_assert_eq!(registry.lookup(&user(u)), Some(session));
            }
        }
    }

    /// Property: after remove_session, the session appears in no room and
    /// every other subscription is untouched.
    #[test]
    fn prop_remove_session_clears_only_that_session(
        joins in proptest::collection::vec((1u64..8, 0u8..4), 1..64),
        removed in 1u64..8,
    ) {
        let mut channels = RoomChannelManager::new();

        for &(session, r) in &joins {
            channels.join(session, room(r));
        }

        channels.remove_session(removed);

        for &(session, r) in &joins {
            if session == removed {
                prop_assert!(!channels.is_subscribed(session, &room(r)));
            } else {
                prop_assert!(channels.is_subscribed(session, &room(r)));
            }
        }
    }

    /// Property: join/leave is symmetric — leaving everything a session
    /// joined leaves no empty rooms behind.
    #[test]
    fn prop_join_leave_garbage_collects(
        joins in proptest::collection::vec((1u64..8, 0u8..4), 1..64)
    ) {
        let mut channels = RoomChannelManager::new();

        for &(session, r) in &joins {
            channels.join(session, room(r));
        }
        for &(session, r) in &joins {
            channels.leave(session, &room(r));
        }

        prop_assert_eq!(channels.room_count(), 0);
    }
}
