//! Core wire-visible identifiers and membership types.
//!
//! Room codes are normalized (ASCII uppercase) and validated at construction,
//! so every `RoomCode` held anywhere in the broker is known-good. User
//! identities are opaque stable strings minted by the excluded auth layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Validated room channel identifier.
///
/// Case-insensitive alphanumeric, 1..=20 characters, normalized to ASCII
/// uppercase at parse time so lookups never depend on client casing. The
/// serde impls route through [`RoomCode::parse`], which means an invalid code
/// in an inbound event fails the whole decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Maximum accepted length, a defensive bound against abusive input.
    pub const MAX_LEN: usize = 20;

    /// Validate and normalize a raw room code.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ProtocolError::InvalidRoomCode("empty".to_string()));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(ProtocolError::InvalidRoomCode(format!(
                "{} characters exceeds limit of {}",
                raw.len(),
                Self::MAX_LEN
            )));
        }
        if let Some(bad) = raw.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(ProtocolError::InvalidRoomCode(format!("character {bad:?} not allowed")));
        }

        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// Normalized code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// Stable logical user identity.
///
/// Opaque and not secret; minted by the excluded authentication layer. The
/// broker only compares and routes by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a raw identity string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Membership state of a user within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    /// Join requested, awaiting the owner's decision.
    Pending,
    /// Approved by the owner; may draw.
    Approved,
    /// Rejected by the owner.
    Rejected,
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// One entry in a room's membership list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    /// Stable identity of the member.
    pub user_id: UserId,
    /// Human-readable name shown to other members.
    pub display_name: String,
    /// Current membership state.
    pub status: MembershipStatus,
}

/// Full membership + owner snapshot of a room.
///
/// Owned by the excluded persistence layer; the broker consumes it for
/// authorization checks and broadcasts it verbatim in `RoomUpdated` events.
///
/// # Invariants
///
/// The owner is always present in `members` with status `Approved`.
/// [`RoomSnapshot::new`] establishes this and [`RoomSnapshot::set_status`]
/// refuses to demote the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// The room's channel code.
    pub code: RoomCode,
    /// Identity of the room owner.
    pub owner: UserId,
    /// All known members, owner included.
    pub members: Vec<RoomMember>,
}

impl RoomSnapshot {
    /// Create a snapshot with the owner installed as an approved member.
    pub fn new(code: RoomCode, owner: UserId, owner_display_name: impl Into<String>) -> Self {
        let owner_member = RoomMember {
            user_id: owner.clone(),
            display_name: owner_display_name.into(),
            status: MembershipStatus::Approved,
        };
        Self { code, owner, members: vec![owner_member] }
    }

    /// Look up a member by identity.
    pub fn member(&self, user_id: &UserId) -> Option<&RoomMember> {
        self.members.iter().find(|m| &m.user_id == user_id)
    }

    /// Insert or replace a member entry, keyed by identity.
    pub fn upsert_member(&mut self, member: RoomMember) {
        match self.members.iter_mut().find(|m| m.user_id == member.user_id) {
            Some(existing) => *existing = member,
            None => self.members.push(member),
        }
    }

    /// Update a member's status.
    ///
    /// Returns `false` if the member is unknown or the change would demote
    /// the owner (the owner is always approved).
    pub fn set_status(&mut self, user_id: &UserId, status: MembershipStatus) -> bool {
        if user_id == &self.owner && status != MembershipStatus::Approved {
            return false;
        }

        match self.members.iter_mut().find(|m| &m.user_id == user_id) {
            Some(member) => {
                member.status = status;
                true
            },
            None => false,
        }
    }
}

/// A point on the shared canvas, in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Point {
    /// Construct a point.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
