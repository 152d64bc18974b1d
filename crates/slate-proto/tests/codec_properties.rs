//! Property-based tests for the wire protocol.
//!
//! Round-trip and validation invariants that must hold for all inputs.

use proptest::prelude::*;
use slate_proto::{
    ClientEvent, DrawingOperation, PREFIX_LEN, Point, RoomCode, ServerEvent, UserId, decode,
    encode, frame_len,
};

fn arb_point() -> impl Strategy<Value = Point> + Clone {
    (-1.0e6f32..1.0e6, -1.0e6f32..1.0e6).prop_map(|(x, y)| Point::new(x, y))
}

fn arb_color() -> impl Strategy<Value = String> + Clone {
    "#[0-9a-f]{6}"
}

fn arb_operation() -> impl Strategy<Value = DrawingOperation> {
    let stroke = (
        proptest::option::of("[a-z0-9]{1,8}"),
        arb_color(),
        0.5f32..64.0,
        proptest::collection::vec(arb_point(), 1..32),
    );
    let shape = (proptest::option::of("[a-z0-9]{1,8}"), arb_color(), 0.5f32..64.0, arb_point(), arb_point());

    prop_oneof![
        stroke.clone().prop_map(|(id, color, width, points)| DrawingOperation::FreehandStroke {
            id,
            color,
            width,
            points
        }),
        stroke.prop_map(|(id, color, width, points)| DrawingOperation::EraseStroke {
            id,
            color,
            width,
            points
        }),
        shape.clone().prop_map(|(id, color, width, start, end)| DrawingOperation::Rectangle {
            id,
            color,
            width,
            start,
            end
        }),
        shape.prop_map(|(id, color, width, start, end)| DrawingOperation::Circle {
            id,
            color,
            width,
            start,
            end
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: every valid room code parses, normalizes to uppercase, and
    /// parsing the normalized form is idempotent.
    #[test]
    fn prop_room_code_normalization(raw in "[a-zA-Z0-9]{1,20}") {
        let code = RoomCode::parse(&raw).unwrap();
        prop_assert_eq!(code.as_str(), raw.to_ascii_uppercase());

        let again = RoomCode::parse(code.as_str()).unwrap();
        prop_assert_eq!(again, code);
    }

    /// Property: any code containing a non-alphanumeric char is rejected.
    #[test]
    fn prop_room_code_rejects_bad_chars(
        prefix in "[a-zA-Z0-9]{0,9}",
        bad in "[^a-zA-Z0-9]",
        suffix in "[a-zA-Z0-9]{0,9}",
    ) {
        let raw = format!("{prefix}{bad}{suffix}");
        prop_assert!(RoomCode::parse(&raw).is_err());
    }

    /// Property: client draw events survive an encode/decode round trip.
    #[test]
    fn prop_draw_event_round_trip(op in arb_operation(), raw_code in "[A-Z0-9]{1,20}") {
        let event = ClientEvent::Draw {
            room_code: RoomCode::parse(&raw_code).unwrap(),
            operation: op,
        };

        let bytes = encode(&event).unwrap();
        let decoded: ClientEvent = decode(&bytes[PREFIX_LEN..]).unwrap();
        prop_assert_eq!(event, decoded);
    }

    /// Property: generated operations always validate and carry a key.
    #[test]
    fn prop_generated_operations_are_valid(op in arb_operation()) {
        prop_assert!(op.validate().is_ok());
        prop_assert!(op.upsert_key().is_some());
    }

    /// Property: the length prefix of an encoded event always round-trips
    /// through frame_len.
    #[test]
    fn prop_frame_len_round_trip(op in arb_operation()) {
        let event = ServerEvent::Draw { operation: op };
        let bytes = encode(&event).unwrap();

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&bytes[..PREFIX_LEN]);
        prop_assert_eq!(frame_len(prefix).unwrap(), bytes.len() - PREFIX_LEN);
    }

    /// Property: an initial-state snapshot of arbitrary size round-trips.
    #[test]
    fn prop_snapshot_round_trip(ops in proptest::collection::vec(arb_operation(), 0..16)) {
        let event = ServerEvent::InitialState { operations: ops };
        let bytes = encode(&event).unwrap();
        let decoded: ServerEvent = decode(&bytes[PREFIX_LEN..]).unwrap();
        prop_assert_eq!(event, decoded);
    }
}

#[test]
fn user_id_is_transparent_on_the_wire() {
    let event = ClientEvent::JoinRoom {
        room_code: RoomCode::parse("ABC123").unwrap(),
        user_id: UserId::from("user-42"),
    };

    let bytes = encode(&event).unwrap();
    let decoded: ClientEvent = decode(&bytes[PREFIX_LEN..]).unwrap();
    assert_eq!(event, decoded);
}
