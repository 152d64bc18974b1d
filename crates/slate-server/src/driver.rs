//! Relay driver.
//!
//! The event broker's dispatcher: takes one inbound [`RelayEvent`], applies
//! the required state mutations (registry, channels, operation log), and
//! returns the [`RelayAction`]s for the runtime to execute. No I/O happens
//! here, which keeps every relay rule independently testable.
//!
//! Ordering: all in-memory mutation for an event completes before the
//! actions are returned, and the runtime drives this type behind a single
//! async mutex. Together that preserves per-sender event order within a
//! room and makes "last write observed by the server wins" the whole
//! conflict story.

use std::collections::HashMap;

use slate_core::{
    canvas::{CanvasError, OperationLog},
    connection::{Connection, ConnectionAction, ConnectionConfig},
    env::Environment,
    membership,
};
use slate_proto::{
    ClientEvent, DrawingOperation, MembershipStatus, RoomCode, ServerEvent, UserId,
};
use thiserror::Error;

use crate::{
    channels::RoomChannelManager,
    directory::{DirectoryError, RoomDirectory},
    registry::ConnectionRegistry,
    storage::{Storage, StorageError},
};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection liveness configuration (heartbeat interval, idle timeout).
    pub connection: ConnectionConfig,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-room operation log cap.
    pub max_operations_per_room: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            max_connections: 10_000,
            max_operations_per_room: slate_core::DEFAULT_MAX_OPERATIONS,
        }
    }
}

/// Events the relay driver processes.
///
/// Produced by the runtime: transport events for connection traffic, control
/// events pushed in from the excluded HTTP layer, and a periodic tick.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// A new connection was accepted by the transport.
    ConnectionAccepted {
        /// Unique session ID assigned by the runtime.
        session_id: u64,
    },

    /// A decoded event arrived from a connection.
    EventReceived {
        /// Connection that sent the event.
        session_id: u64,
        /// The received event.
        event: ClientEvent,
    },

    /// A connection was closed (by peer, timeout, or error).
    ConnectionClosed {
        /// Connection that was closed.
        session_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// An out-of-band event from the excluded HTTP layer.
    Control(ControlEvent),

    /// Periodic tick for liveness maintenance.
    Tick,
}

/// Out-of-band events pushed in by the excluded HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A member's status changed (approve/reject/re-pend).
    MembershipChanged {
        /// Room the change applies to.
        room_code: RoomCode,
        /// Affected member.
        member_id: UserId,
        /// New status.
        status: MembershipStatus,
    },

    /// A user requested to join a room.
    JoinRequested {
        /// Room the request is for.
        room_code: RoomCode,
        /// Identity of the requester.
        requester_id: UserId,
        /// Display name of the requester.
        requester_display_name: String,
    },
}

/// Actions the relay driver produces.
///
/// Executed by runtime-specific code against the real transport and storage.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    /// Send an event to a specific session.
    SendToSession {
        /// Target session ID.
        session_id: u64,
        /// Event to send.
        event: ServerEvent,
    },

    /// Broadcast an event to all sessions subscribed to a room.
    BroadcastToRoom {
        /// Target room.
        room_code: RoomCode,
        /// Event to broadcast.
        event: ServerEvent,
        /// Optional session to exclude from the fan-out.
        exclude_session: Option<u64>,
    },

    /// Close a connection.
    CloseConnection {
        /// Session to close.
        session_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Persist a room's canvas (best-effort; failures never roll back).
    PersistCanvas {
        /// Room whose canvas changed.
        room_code: RoomCode,
        /// Full operation sequence at the time of mutation.
        operations: Vec<DrawingOperation>,
    },

    /// Log a message (for debugging/monitoring).
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for relay actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Errors from relay processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Event referenced a session the driver doesn't know.
    #[error("session not found: {0}")]
    SessionNotFound(u64),

    /// Room directory lookup failed.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Storage failed during recovery (not on the best-effort persist path).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Action-based relay driver.
///
/// Owns all shared mutable broker state: the connection registry, the room
/// channel subscriptions, and the per-room operation log. The transport and
/// the membership gate never touch these directly.
pub struct RelayDriver<E, S, D>
where
    E: Environment,
    S: Storage,
    D: RoomDirectory,
{
    /// Connection liveness machines (session_id → Connection)
    connections: HashMap<u64, Connection<E::Instant>>,
    /// User identity → current session routing
    registry: ConnectionRegistry,
    /// Room-scoped broadcast group subscriptions
    channels: RoomChannelManager,
    /// Per-room canvas mirror
    log: OperationLog,
    /// Membership data source (excluded HTTP layer)
    directory: D,
    /// Canvas persistence backend
    storage: S,
    /// Environment (time, RNG)
    env: E,
    /// Relay configuration
    config: RelayConfig,
}

impl<E, S, D> RelayDriver<E, S, D>
where
    E: Environment,
    S: Storage,
    D: RoomDirectory,
{
    /// Create a new relay driver.
    pub fn new(env: E, storage: S, directory: D, config: RelayConfig) -> Self {
        Self {
            connections: HashMap::new(),
            registry: ConnectionRegistry::new(),
            channels: RoomChannelManager::new(),
            log: OperationLog::with_limit(config.max_operations_per_room),
            directory,
            storage,
            env,
            config,
        }
    }

    /// Restore persisted canvases into the operation log.
    ///
    /// Called once at startup, before connections are accepted. Returns the
    /// number of rooms restored.
    pub fn restore_canvases(&mut self) -> Result<usize, RelayError> {
        let rooms = self.storage.list_rooms()?;
        let count = rooms.len();

        for room in rooms {
            let operations = self.storage.load_canvas(&room)?.unwrap_or_default();
            tracing::debug!(room = %room, operations = operations.len(), "restored canvas");
            self.log.restore(room, operations);
        }

        Ok(count)
    }

    /// Process a relay event and return actions to execute.
    ///
    /// This is the broker's single dispatch entry point.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, RelayError> {
        match event {
            RelayEvent::ConnectionAccepted { session_id } => {
                Ok(self.handle_connection_accepted(session_id))
            },
            RelayEvent::EventReceived { session_id, event } => {
                self.handle_event_received(session_id, event)
            },
            RelayEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason))
            },
            RelayEvent::Control(control) => self.handle_control(control),
            RelayEvent::Tick => Ok(self.handle_tick()),
        }
    }

    fn handle_connection_accepted(&mut self, session_id: u64) -> Vec<RelayAction> {
        if self.connections.len() >= self.config.max_connections {
            return vec![RelayAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }];
        }

        let now = self.env.now();
        self.connections.insert(session_id, Connection::new(now, self.config.connection.clone()));

        vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("connection accepted, session_id={session_id}"),
        }]
    }

    fn handle_event_received(
        &mut self,
        session_id: u64,
        event: ClientEvent,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let now = self.env.now();

        let conn = self
            .connections
            .get_mut(&session_id)
            .ok_or(RelayError::SessionNotFound(session_id))?;

        match event {
            ClientEvent::Ping => {
                let actions = conn.handle_ping(now);
                Ok(convert_connection_actions(session_id, actions))
            },

            ClientEvent::Pong => {
                conn.handle_pong(now);
                Ok(Vec::new())
            },

            ClientEvent::JoinRoom { room_code, user_id } => {
                conn.update_activity(now);
                Ok(self.handle_join(session_id, room_code, user_id))
            },

            ClientEvent::LeaveRoom { room_code, user_id } => {
                conn.update_activity(now);
                Ok(self.handle_leave(session_id, &room_code, &user_id))
            },

            ClientEvent::Draw { room_code, operation } => {
                conn.update_activity(now);
                self.handle_draw(session_id, room_code, operation)
            },

            ClientEvent::Clear { room_code } => {
                conn.update_activity(now);
                Ok(self.handle_clear(&room_code))
            },

            ClientEvent::Viewport { room_code, pan, zoom } => {
                conn.update_activity(now);
                Ok(vec![RelayAction::BroadcastToRoom {
                    room_code,
                    event: ServerEvent::ViewportState { pan, zoom },
                    exclude_session: Some(session_id),
                }])
            },
        }
    }

    /// Subscribe the session and hand it the canvas it missed.
    ///
    /// The snapshot is taken inside this call, so nothing upserted before
    /// the join can be missing from the initial state.
    fn handle_join(
        &mut self,
        session_id: u64,
        room_code: RoomCode,
        user_id: UserId,
    ) -> Vec<RelayAction> {
        let mut actions = Vec::new();

        self.channels.join(session_id, room_code.clone());

        if let Some(displaced) = self.registry.register(user_id.clone(), session_id) {
            actions.push(RelayAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "user {user_id} reconnected as session {session_id}, superseding {displaced}"
                ),
            });
        }

        actions.push(RelayAction::Log {
            level: LogLevel::Info,
            message: format!("user {user_id} joined room {room_code} (session {session_id})"),
        });
        actions.push(RelayAction::SendToSession {
            session_id,
            event: ServerEvent::InitialState { operations: self.log.snapshot(&room_code) },
        });

        actions
    }

    fn handle_leave(
        &mut self,
        session_id: u64,
        room_code: &RoomCode,
        user_id: &UserId,
    ) -> Vec<RelayAction> {
        self.channels.leave(session_id, room_code);

        // Only unregister if this session still holds the identity; a newer
        // connection may have claimed it since.
        let unregistered = self.registry.remove_if_current(user_id, session_id);

        vec![RelayAction::Log {
            level: LogLevel::Info,
            message: format!(
                "user {user_id} left room {room_code} (session {session_id}, unregistered: {unregistered})"
            ),
        }]
    }

    fn handle_draw(
        &mut self,
        session_id: u64,
        room_code: RoomCode,
        operation: DrawingOperation,
    ) -> Result<Vec<RelayAction>, RelayError> {
        // Malformed geometry is a protocol violation, not a policy refusal.
        if let Err(e) = operation.validate() {
            return Ok(vec![RelayAction::CloseConnection {
                session_id,
                reason: e.to_string(),
            }]);
        }

        let Some(user_id) = self.registry.identity_of(session_id).cloned() else {
            return Ok(self.reject_draw(session_id, room_code, "no identity joined"));
        };

        // Membership is re-read on every draw; the client-side gate is not
        // trustworthy.
        let Some(room) = self.directory.find_room(&room_code)? else {
            return Ok(self.reject_draw(session_id, room_code, "unknown room"));
        };

        if !membership::can_draw(&user_id, &room) {
            return Ok(self.reject_draw(session_id, room_code, "not an approved member"));
        }

        match self.log.upsert(&room_code, operation.clone()) {
            Ok(_) => Ok(vec![
                RelayAction::PersistCanvas {
                    room_code: room_code.clone(),
                    operations: self.log.snapshot(&room_code),
                },
                RelayAction::BroadcastToRoom {
                    room_code,
                    event: ServerEvent::Draw { operation },
                    exclude_session: Some(session_id),
                },
            ]),
            Err(CanvasError::RoomFull { limit, .. }) => {
                Ok(self.reject_draw(session_id, room_code, &format!("room full ({limit} operations)")))
            },
        }
    }

    /// Refuse a draw: nothing enters the log, nothing is fanned out, and the
    /// sender gets a targeted notice.
    fn reject_draw(
        &self,
        session_id: u64,
        room_code: RoomCode,
        reason: &str,
    ) -> Vec<RelayAction> {
        vec![
            RelayAction::Log {
                level: LogLevel::Warn,
                message: format!(
                    "rejected draw into {room_code} from session {session_id}: {reason}"
                ),
            },
            RelayAction::SendToSession {
                session_id,
                event: ServerEvent::DrawRejected { room_code, reason: reason.to_string() },
            },
        ]
    }

    fn handle_clear(&mut self, room_code: &RoomCode) -> Vec<RelayAction> {
        self.log.clear(room_code);

        vec![
            RelayAction::PersistCanvas { room_code: room_code.clone(), operations: Vec::new() },
            // Clear goes to the sender too: clients wipe unconditionally,
            // so the echo is idempotent.
            RelayAction::BroadcastToRoom {
                room_code: room_code.clone(),
                event: ServerEvent::Clear,
                exclude_session: None,
            },
        ]
    }

    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<RelayAction> {
        // Cleanup must run exactly once; later duplicates are no-ops.
        let Some(mut conn) = self.connections.remove(&session_id) else {
            return Vec::new();
        };
        conn.close();

        let rooms = self.channels.remove_session(session_id);
        let identity = self.registry.remove_by_session(session_id);

        vec![RelayAction::Log {
            level: LogLevel::Info,
            message: format!(
                "connection {session_id} closed: {reason}, was in {} rooms, identity {identity:?}",
                rooms.len()
            ),
        }]
    }

    fn handle_control(&mut self, control: ControlEvent) -> Result<Vec<RelayAction>, RelayError> {
        match control {
            ControlEvent::MembershipChanged { room_code, member_id, status } => {
                self.handle_membership_changed(&room_code, &member_id, status)
            },
            ControlEvent::JoinRequested { room_code, requester_id, requester_display_name } => {
                self.handle_join_requested(&room_code, requester_id, requester_display_name)
            },
        }
    }

    fn handle_membership_changed(
        &mut self,
        room_code: &RoomCode,
        member_id: &UserId,
        status: MembershipStatus,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let Some(room) = self.directory.find_room(room_code)? else {
            return Ok(vec![RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("membership change for unknown room {room_code}, dropped"),
            }]);
        };

        let mut actions = Vec::new();

        // (a) Tell the owner, if connected.
        if let Some(owner_session) = self.registry.lookup(&room.owner) {
            actions.push(RelayAction::SendToSession {
                session_id: owner_session,
                event: ServerEvent::MemberStatusUpdated {
                    room_code: room_code.clone(),
                    member_id: member_id.clone(),
                    status,
                    message: format!("{member_id} is now {status}"),
                },
            });
        }

        // (b) Tell the affected member, if connected.
        if let Some(member_session) = self.registry.lookup(member_id) {
            actions.push(RelayAction::SendToSession {
                session_id: member_session,
                event: ServerEvent::YourStatusUpdated { room_code: room_code.clone(), status },
            });
        }

        // (c) Refresh everyone watching the room, including connections not
        // yet tracked under an identity (e.g. viewers awaiting approval).
        actions.push(RelayAction::BroadcastToRoom {
            room_code: room_code.clone(),
            event: ServerEvent::RoomUpdated { room },
            exclude_session: None,
        });

        Ok(actions)
    }

    fn handle_join_requested(
        &mut self,
        room_code: &RoomCode,
        requester_id: UserId,
        requester_display_name: String,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let Some(room) = self.directory.find_room(room_code)? else {
            return Ok(vec![RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("join request for unknown room {room_code}, dropped"),
            }]);
        };

        // Presence is fire-and-forget: no queued delivery for offline owners.
        let Some(owner_session) = self.registry.lookup(&room.owner) else {
            return Ok(vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "owner {} of {room_code} not connected, dropping join request from {requester_id}",
                    room.owner
                ),
            }]);
        };

        Ok(vec![RelayAction::SendToSession {
            session_id: owner_session,
            event: ServerEvent::NewJoinRequest {
                room_code: room_code.clone(),
                requester_id,
                requester_display_name,
            },
        }])
    }

    fn handle_tick(&mut self) -> Vec<RelayAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for (session_id, conn) in &mut self.connections {
            let conn_actions = conn.tick(now);
            actions.extend(convert_connection_actions(*session_id, conn_actions));
        }

        actions
    }

    /// All sessions subscribed to a room (for the fan-out executor).
    pub fn sessions_in_room(&self, room: &RoomCode) -> impl Iterator<Item = u64> + '_ {
        self.channels.sessions_in(room)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Current session for a user identity, if connected.
    pub fn session_for_user(&self, user_id: &UserId) -> Option<u64> {
        self.registry.lookup(user_id)
    }

    /// Number of operations held for a room.
    pub fn operation_count(&self, room: &RoomCode) -> usize {
        self.log.operation_count(room)
    }

    /// Storage backend for canvas persistence.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<E, S, D> std::fmt::Debug for RelayDriver<E, S, D>
where
    E: Environment,
    S: Storage,
    D: RoomDirectory,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver")
            .field("connection_count", &self.connections.len())
            .field("user_count", &self.registry.user_count())
            .field("room_count", &self.channels.room_count())
            .finish()
    }
}

/// Map liveness actions onto relay actions for one session.
fn convert_connection_actions(
    session_id: u64,
    actions: Vec<ConnectionAction>,
) -> Vec<RelayAction> {
    actions
        .into_iter()
        .map(|action| match action {
            ConnectionAction::SendPing => {
                RelayAction::SendToSession { session_id, event: ServerEvent::Ping }
            },
            ConnectionAction::SendPong => {
                RelayAction::SendToSession { session_id, event: ServerEvent::Pong }
            },
            ConnectionAction::Close { reason } => {
                RelayAction::CloseConnection { session_id, reason }
            },
        })
        .collect()
}
