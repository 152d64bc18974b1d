//! Tagged inbound and outbound event types.
//!
//! The broker's external interface is two enums: [`ClientEvent`] for
//! everything a client may send, [`ServerEvent`] for everything the broker
//! may deliver. Both are internally tagged (`"event"` field) so payloads are
//! validated tagged structures, never open-ended dictionaries.

use serde::{Deserialize, Serialize};

use crate::{
    op::DrawingOperation,
    types::{MembershipStatus, Point, RoomCode, RoomSnapshot, UserId},
};

/// Events a client may send to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Subscribe this connection to a room channel under a user identity.
    JoinRoom {
        /// Target room channel.
        room_code: RoomCode,
        /// Authenticated identity the connection acts as.
        user_id: UserId,
    },

    /// Unsubscribe this connection from a room channel.
    LeaveRoom {
        /// Target room channel.
        room_code: RoomCode,
        /// Identity that joined the room.
        user_id: UserId,
    },

    /// Submit a drawing operation (full authoritative state, not a delta).
    Draw {
        /// Target room channel.
        room_code: RoomCode,
        /// The operation, resent in full as it grows.
        operation: DrawingOperation,
    },

    /// Wipe the room's canvas.
    Clear {
        /// Target room channel.
        room_code: RoomCode,
    },

    /// Advisory viewport change (pan and/or zoom).
    ///
    /// Clients rate-limit emission to a 30ms minimum interval; the broker
    /// relays without depending on that.
    Viewport {
        /// Target room channel.
        room_code: RoomCode,
        /// New pan offset, if it changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pan: Option<Point>,
        /// New zoom factor, if it changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zoom: Option<f32>,
    },

    /// Liveness probe.
    Ping,

    /// Liveness response.
    Pong,
}

/// Events the broker may deliver to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A drawing operation from another subscriber of the room.
    Draw {
        /// The operation, verbatim as received.
        operation: DrawingOperation,
    },

    /// The room's canvas was wiped. Idempotent on the client side.
    Clear,

    /// Canvas snapshot delivered to a freshly joined connection.
    InitialState {
        /// Full operation sequence in z-order.
        operations: Vec<DrawingOperation>,
    },

    /// Full membership + owner snapshot, broadcast room-wide after any
    /// membership change.
    RoomUpdated {
        /// The updated room state.
        room: RoomSnapshot,
    },

    /// Targeted to the room owner when someone requests to join.
    NewJoinRequest {
        /// Room the request is for.
        room_code: RoomCode,
        /// Identity of the requester.
        requester_id: UserId,
        /// Display name of the requester.
        requester_display_name: String,
    },

    /// Targeted to the room owner when a member's status changed.
    MemberStatusUpdated {
        /// Room the change applies to.
        room_code: RoomCode,
        /// Affected member.
        member_id: UserId,
        /// New status.
        status: MembershipStatus,
        /// Human-readable summary of the change.
        message: String,
    },

    /// Targeted to the member whose own status changed.
    YourStatusUpdated {
        /// Room the change applies to.
        room_code: RoomCode,
        /// The member's new status.
        status: MembershipStatus,
    },

    /// Advisory viewport state from another subscriber.
    ViewportState {
        /// New pan offset, if it changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pan: Option<Point>,
        /// New zoom factor, if it changed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zoom: Option<f32>,
    },

    /// Targeted to the sender of a draw the broker refused.
    DrawRejected {
        /// Room the draw was aimed at.
        room_code: RoomCode,
        /// Why it was refused.
        reason: String,
    },

    /// Liveness probe.
    Ping,

    /// Liveness response.
    Pong,
}
