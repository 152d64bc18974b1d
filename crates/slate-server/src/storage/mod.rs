//! Storage abstraction for canvas persistence.
//!
//! The broker persists each room's full operation sequence after every
//! mutation, best-effort: a failed write is logged and the in-memory log
//! stays authoritative for the live session. The trait is synchronous; the
//! runtime calls it from the action executor after fan-out state is already
//! settled.

mod memory;
mod redb;

use slate_proto::{DrawingOperation, RoomCode};
use thiserror::Error;

pub use self::{memory::MemoryStorage, redb::RedbStorage};

/// Errors from storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying I/O or database failure.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Canvas (de)serialization failure.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

/// Storage abstraction for per-room canvas state.
///
/// Must be Clone (shared between the driver and the action executor),
/// Send + Sync, and synchronous. Implementations typically share internal
/// state via Arc, so clones access the same underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Persist a room's full operation sequence, replacing any prior state.
    fn save_canvas(
        &self,
        room: &RoomCode,
        operations: &[DrawingOperation],
    ) -> Result<(), StorageError>;

    /// Load a room's persisted operation sequence.
    ///
    /// Returns `None` if the room has no persisted canvas.
    fn load_canvas(&self, room: &RoomCode) -> Result<Option<Vec<DrawingOperation>>, StorageError>;

    /// Drop a room's persisted canvas (the durable form of `clear`).
    ///
    /// Idempotent: clearing an unknown room is a no-op.
    fn clear_canvas(&self, room: &RoomCode) -> Result<(), StorageError>;

    /// List all rooms with a persisted canvas.
    ///
    /// Used for server recovery to restore canvases on startup. Order is
    /// not guaranteed.
    fn list_rooms(&self) -> Result<Vec<RoomCode>, StorageError>;
}
