//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Canvases survive server restarts and are restored into the operation log
//! during recovery.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use slate_proto::{DrawingOperation, RoomCode};

use super::{Storage, StorageError};

/// Table: canvases
/// Key: normalized room code (UTF-8)
/// Value: CBOR-encoded `Vec<DrawingOperation>`
const CANVASES: TableDefinition<&str, &[u8]> = TableDefinition::new("canvases");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the canvases table if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(CANVASES).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn save_canvas(
        &self,
        room: &RoomCode,
        operations: &[DrawingOperation],
    ) -> Result<(), StorageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&operations, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(CANVASES).map_err(|e| StorageError::Io(e.to_string()))?;
            table
                .insert(room.as_str(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn load_canvas(&self, room: &RoomCode) -> Result<Option<Vec<DrawingOperation>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(CANVASES).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(room.as_str()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => {
                let operations: Vec<DrawingOperation> = ciborium::from_reader(value.value())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(operations))
            },
            None => Ok(None),
        }
    }

    fn clear_canvas(&self, room: &RoomCode) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(CANVASES).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(room.as_str()).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn list_rooms(&self) -> Result<Vec<RoomCode>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(CANVASES).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut rooms = Vec::new();
        for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (key, _) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            // Keys are written from validated codes; a failure here means
            // the table was corrupted or written by something else.
            let code = RoomCode::parse(key.value())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            rooms.push(code);
        }

        Ok(rooms)
    }
}
