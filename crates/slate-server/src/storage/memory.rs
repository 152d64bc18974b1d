use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use slate_proto::{DrawingOperation, RoomCode};

use super::{Storage, StorageError};

/// In-memory storage implementation for testing and ephemeral deployments.
///
/// All state is wrapped in `Arc<Mutex<>>` so clones share the same
/// underlying map. Thread-safe through the mutex, but uses
/// `lock().expect()` which will panic if the mutex is poisoned — acceptable
/// for test-grade storage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<RoomCode, Vec<DrawingOperation>>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with a persisted canvas.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    pub fn canvas_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }
}

impl Storage for MemoryStorage {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn save_canvas(
        &self,
        room: &RoomCode,
        operations: &[DrawingOperation],
    ) -> Result<(), StorageError> {
        self.inner
            .lock()
            .expect("Mutex poisoned")
            .insert(room.clone(), operations.to_vec());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn load_canvas(&self, room: &RoomCode) -> Result<Option<Vec<DrawingOperation>>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").get(room).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn clear_canvas(&self, room: &RoomCode) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").remove(room);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    fn list_rooms(&self) -> Result<Vec<RoomCode>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").keys().cloned().collect())
    }
}
