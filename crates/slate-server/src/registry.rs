//! Connection registry: user identity → live connection mapping.
//!
//! Registration is last-write-wins: a later connect for the same identity
//! unconditionally supersedes the prior mapping, which is what makes
//! multi-tab reconnection work without stale routing. The superseded
//! connection is not closed — it simply stops being the routing target for
//! targeted notifications.
//!
//! Disconnect events carry only a session id, not an identity, so cleanup
//! goes through a reverse binding (session → identity) kept alongside the
//! forward map.

use std::collections::HashMap;

use slate_proto::UserId;

/// Registry mapping each user identity to its current live session.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// User ID → current session (last-write-wins)
    current: HashMap<UserId, u64>,
    /// Session ID → identity the session registered as
    identities: HashMap<u64, UserId>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user_id` as acting through `session_id`.
    ///
    /// Unconditionally overwrites any prior mapping for that identity.
    /// Returns the displaced session id, if a different session previously
    /// held the identity.
    pub fn register(&mut self, user_id: UserId, session_id: u64) -> Option<u64> {
        // A session that re-registers under a new identity stops being the
        // routing target for its old one.
        if let Some(previous_identity) = self.identities.insert(session_id, user_id.clone()) {
            if previous_identity != user_id
                && self.current.get(&previous_identity) == Some(&session_id)
            {
                self.current.remove(&previous_identity);
            }
        }

        let displaced = self.current.insert(user_id, session_id);
        displaced.filter(|prev| *prev != session_id)
    }

    /// Current session for an identity, if one is registered.
    pub fn lookup(&self, user_id: &UserId) -> Option<u64> {
        self.current.get(user_id).copied()
    }

    /// Identity a session registered as, if any.
    pub fn identity_of(&self, session_id: u64) -> Option<&UserId> {
        self.identities.get(&session_id)
    }

    /// Remove all state for a disconnected session.
    ///
    /// The forward entry is removed only if this session is still the
    /// current mapping for its identity — a superseded session disconnecting
    /// must not unregister the newer one. Returns the identity the session
    /// was bound to, if any.
    pub fn remove_by_session(&mut self, session_id: u64) -> Option<UserId> {
        let user_id = self.identities.remove(&session_id)?;

        if self.current.get(&user_id) == Some(&session_id) {
            self.current.remove(&user_id);
        }

        Some(user_id)
    }

    /// Remove the mapping for `user_id` only if `session_id` still holds it.
    ///
    /// Used on explicit room-leave: an unconditional delete here could
    /// wrongly unregister a newer connection that has since claimed the
    /// identity.
    pub fn remove_if_current(&mut self, user_id: &UserId, session_id: u64) -> bool {
        if self.current.get(user_id) != Some(&session_id) {
            return false;
        }

        self.current.remove(user_id);
        self.identities.remove(&session_id);
        true
    }

    /// Number of identities with a current session.
    pub fn user_count(&self) -> usize {
        self.current.len()
    }
}
