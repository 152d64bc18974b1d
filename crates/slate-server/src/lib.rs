//! Slate whiteboard broker server.
//!
//! Production runtime wrapping the action-based relay logic with real I/O:
//! Quinn for QUIC transport, Tokio for the async runtime, system time with
//! cryptographic RNG.
//!
//! # Architecture
//!
//! [`RelayDriver`] is the pure dispatcher (events in, actions out, no I/O);
//! [`Server`] executes its actions against the transport and storage. The
//! driver sits behind a single async mutex, and each event is processed and
//! its actions executed without releasing the lock, so in-memory mutation
//! and fan-out form one critical section — the ordering guarantee rests on
//! that.
//!
//! # Components
//!
//! - [`RelayDriver`]: connection registry + room channels + operation log
//! - [`Server`]: production runtime executing relay actions
//! - [`ControlHandle`]: seam for the excluded HTTP layer to push membership
//!   events into the relay
//! - [`QuinnTransport`]: QUIC transport via the Quinn library
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod channels;
mod directory;
mod driver;
mod error;
mod registry;
pub mod storage;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

pub use channels::RoomChannelManager;
pub use directory::{DirectoryError, MemoryDirectory, RoomDirectory};
pub use driver::{
    ControlEvent, LogLevel, RelayAction, RelayConfig, RelayDriver, RelayError, RelayEvent,
};
pub use error::ServerError;
pub use registry::ConnectionRegistry;
use slate_core::env::Environment;
use slate_proto::{ClientEvent, MembershipStatus, RoomCode, ServerEvent, UserId};
pub use storage::{MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
use tokio::sync::{Mutex, RwLock, mpsc};
pub use transport::{QuinnConnection, QuinnTransport};

/// Interval between liveness ticks.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Buffered control events before the HTTP layer sees backpressure.
const CONTROL_QUEUE_DEPTH: usize = 256;

/// Shared per-connection transport state for message routing.
struct SharedState {
    /// Session ID → QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Session ID → persistent outbound stream. All events to a client go
    /// through this single stream, ensuring per-connection ordering.
    outbound_streams: RwLock<HashMap<u64, Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Relay configuration (liveness, limits)
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            relay: RelayConfig::default(),
        }
    }
}

/// Clonable handle for pushing HTTP-layer events into the relay.
///
/// Lookup misses on the receiving side are fire-and-forget; the only error
/// surfaced here is a closed control channel (server shut down).
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlEvent>,
}

impl ControlHandle {
    /// Push a member status change into the relay.
    pub async fn membership_changed(
        &self,
        room_code: RoomCode,
        member_id: UserId,
        status: MembershipStatus,
    ) -> Result<(), ServerError> {
        self.tx
            .send(ControlEvent::MembershipChanged { room_code, member_id, status })
            .await
            .map_err(|_| ServerError::Internal("control channel closed".to_string()))
    }

    /// Push a join request notification into the relay.
    pub async fn join_requested(
        &self,
        room_code: RoomCode,
        requester_id: UserId,
        requester_display_name: String,
    ) -> Result<(), ServerError> {
        self.tx
            .send(ControlEvent::JoinRequested { room_code, requester_id, requester_display_name })
            .await
            .map_err(|_| ServerError::Internal("control channel closed".to_string()))
    }
}

/// Production slate broker.
///
/// Wraps [`RelayDriver`] with Quinn QUIC transport and the system
/// environment.
pub struct Server<S, D>
where
    S: Storage,
    D: RoomDirectory,
{
    driver: RelayDriver<SystemEnv, S, D>,
    transport: QuinnTransport,
    env: SystemEnv,
    control_tx: mpsc::Sender<ControlEvent>,
    control_rx: mpsc::Receiver<ControlEvent>,
}

impl<S, D> Server<S, D>
where
    S: Storage,
    D: RoomDirectory,
{
    /// Create and bind a new server, restoring persisted canvases first.
    pub fn bind(
        config: ServerRuntimeConfig,
        storage: S,
        directory: D,
    ) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let mut driver = RelayDriver::new(env.clone(), storage, directory, config.relay);

        let restored = driver.restore_canvases()?;
        if restored > 0 {
            tracing::info!("restored {restored} persisted canvases");
        }

        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);

        Ok(Self { driver, transport, env, control_tx, control_rx })
    }

    /// Handle for the excluded HTTP layer to push membership events.
    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle { tx: self.control_tx.clone() }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server until shut down or a fatal error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("broker listening on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        // Control plane: membership events from the HTTP layer.
        {
            let driver = Arc::clone(&driver);
            let shared = Arc::clone(&shared);
            let mut control_rx = self.control_rx;

            tokio::spawn(async move {
                while let Some(event) = control_rx.recv().await {
                    drive(&driver, RelayEvent::Control(event), &shared).await;
                }
            });
        }

        // Liveness ticks: heartbeats and idle timeouts.
        {
            let driver = Arc::clone(&driver);
            let shared = Arc::clone(&shared);
            let env = env.clone();

            tokio::spawn(async move {
                loop {
                    env.sleep(TICK_INTERVAL).await;
                    drive(&driver, RelayEvent::Tick, &shared).await;
                }
            });
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, env).await {
                            tracing::error!("connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                },
            }
        }
    }
}

/// Lock the driver, process one event, and execute its actions before
/// releasing the lock.
///
/// Processing and execution share the lock deliberately: the in-memory
/// mutation and the resulting fan-out form one critical section per event,
/// which is what upholds the per-sender ordering guarantee.
async fn drive<S, D>(
    driver: &Arc<Mutex<RelayDriver<SystemEnv, S, D>>>,
    event: RelayEvent,
    shared: &SharedState,
) where
    S: Storage,
    D: RoomDirectory,
{
    let mut driver = driver.lock().await;

    match driver.process_event(event) {
        Ok(actions) => execute_actions(&driver, actions, shared).await,
        Err(e) => tracing::warn!("relay processing error: {}", e),
    }
}

/// Handle a single QUIC connection from accept to close.
async fn handle_connection<S, D>(
    conn: QuinnConnection,
    driver: Arc<Mutex<RelayDriver<SystemEnv, S, D>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError>
where
    S: Storage,
    D: RoomDirectory,
{
    let session_id = env.random_u64();

    tracing::debug!("new connection {} from {}", session_id, conn.remote_addr());

    let outbound_stream = conn.open_uni().await?;

    {
        let mut connections = shared.connections.write().await;
        connections.insert(session_id, conn.clone());
    }
    {
        let mut streams = shared.outbound_streams.write().await;
        streams.insert(session_id, Mutex::new(outbound_stream));
    }

    drive(&driver, RelayEvent::ConnectionAccepted { session_id }, &shared).await;

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(session_id, send, recv, driver, &shared).await {
                        tracing::debug!("stream error on session {}: {}", session_id, e);
                    }
                });
            },
            Err(e) => {
                tracing::debug!("connection {} closed: {}", session_id, e);
                break;
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&session_id);
    }
    {
        let mut streams = shared.outbound_streams.write().await;
        streams.remove(&session_id);
    }

    drive(
        &driver,
        RelayEvent::ConnectionClosed { session_id, reason: "connection closed".to_string() },
        &shared,
    )
    .await;

    Ok(())
}

/// Read length-prefixed events off one bidirectional stream.
///
/// Malformed input (oversized claim, undecodable CBOR, invalid room code)
/// terminates the whole connection, per the error taxonomy — there is no
/// way to resynchronize a corrupt framing stream.
async fn handle_stream<S, D>(
    session_id: u64,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: Arc<Mutex<RelayDriver<SystemEnv, S, D>>>,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError>
where
    S: Storage,
    D: RoomDirectory,
{
    drop(send); // server events go over the dedicated outbound stream

    loop {
        let mut prefix = [0u8; slate_proto::PREFIX_LEN];
        match recv.read_exact(&mut prefix).await {
            Ok(()) => {},
            Err(e) => {
                tracing::debug!("read ended for session {}: {}", session_id, e);
                return Ok(());
            },
        }

        let body_len = match slate_proto::frame_len(prefix) {
            Ok(len) => len,
            Err(e) => {
                terminate(session_id, shared, &e.to_string()).await;
                return Err(e.into());
            },
        };

        let mut body = vec![0u8; body_len];
        if let Err(e) = recv.read_exact(&mut body).await {
            tracing::debug!("body read error for session {}: {}", session_id, e);
            return Ok(());
        }

        let event: ClientEvent = match slate_proto::decode(&body) {
            Ok(event) => event,
            Err(e) => {
                terminate(session_id, shared, &e.to_string()).await;
                return Err(e.into());
            },
        };

        drive(&driver, RelayEvent::EventReceived { session_id, event }, shared).await;
    }
}

/// Forcibly close a connection that sent malformed input.
async fn terminate(session_id: u64, shared: &SharedState, reason: &str) {
    tracing::warn!("terminating session {}: {}", session_id, reason);

    let mut connections = shared.connections.write().await;
    if let Some(conn) = connections.remove(&session_id) {
        conn.close(1u32.into(), reason.as_bytes());
    }
}

/// Execute relay actions against the transport and storage.
async fn execute_actions<S, D>(
    driver: &RelayDriver<SystemEnv, S, D>,
    actions: Vec<RelayAction>,
    shared: &SharedState,
) where
    S: Storage,
    D: RoomDirectory,
{
    for action in actions {
        match action {
            RelayAction::SendToSession { session_id, event } => {
                send_to_session(session_id, &event, shared).await;
            },

            RelayAction::BroadcastToRoom { room_code, event, exclude_session } => {
                let sessions: Vec<u64> = driver.sessions_in_room(&room_code).collect();

                for session_id in sessions {
                    if Some(session_id) != exclude_session {
                        send_to_session(session_id, &event, shared).await;
                    }
                }
            },

            RelayAction::CloseConnection { session_id, reason } => {
                tracing::info!("closing connection {}: {}", session_id, reason);
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            RelayAction::PersistCanvas { room_code, operations } => {
                // Best-effort: the in-memory log stays authoritative even
                // when the write fails.
                let result = if operations.is_empty() {
                    driver.storage().clear_canvas(&room_code)
                } else {
                    driver.storage().save_canvas(&room_code, &operations)
                };

                if let Err(e) = result {
                    tracing::error!("failed to persist canvas for {}: {}", room_code, e);
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

/// Encode an event and write it to a session's outbound stream.
async fn send_to_session(session_id: u64, event: &ServerEvent, shared: &SharedState) {
    let bytes = match slate_proto::encode(event) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("failed to encode event for session {}: {}", session_id, e);
            return;
        },
    };

    let streams = shared.outbound_streams.read().await;
    match streams.get(&session_id) {
        Some(stream_mutex) => {
            let mut stream = stream_mutex.lock().await;
            if let Err(e) = stream.write_all(&bytes).await {
                tracing::warn!("write failed for session {}: {}", session_id, e);
            }
        },
        // Lookup miss: the target disconnected in the meantime. Presence is
        // fire-and-forget, so the event is simply dropped.
        None => tracing::debug!("session {} has no outbound stream, dropping event", session_id),
    }
}
