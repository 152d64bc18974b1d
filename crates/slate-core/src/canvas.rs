//! Per-room drawing operation log.
//!
//! Holds the server-side mirror of every room's canvas: an ordered sequence
//! of operations whose insertion order is the z-order clients render in.
//! Mutation is upsert-by-key or full clear, nothing else. The relay driver
//! is the sole writer; persistence happens outside this type, from snapshots
//! it hands out.
//!
//! Upsert semantics exist because clients stream a growing stroke as
//! repeated full-object sends: each send is the authoritative full state of
//! that stroke, so a match replaces in place (preserving z-order) rather
//! than appending a duplicate.

use std::collections::HashMap;

use slate_proto::{DrawingOperation, RoomCode};
use thiserror::Error;

/// Default per-room operation cap.
///
/// Hardening against unbounded memory growth from a misbehaving client, not
/// a business rule.
pub const DEFAULT_MAX_OPERATIONS: usize = 10_000;

/// Errors from operation log mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanvasError {
    /// The room's operation sequence is at capacity and the upsert would
    /// append.
    #[error("room {room} is full: {limit} operations")]
    RoomFull {
        /// Room whose log is at capacity.
        room: RoomCode,
        /// The enforced cap.
        limit: usize,
    },
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No existing operation matched; appended at the end.
    Inserted,
    /// An existing operation matched and was replaced in place.
    Replaced {
        /// Position of the replaced operation (z-order preserved).
        index: usize,
    },
}

/// Ordered, mutable collection of drawing operations per room.
#[derive(Debug)]
pub struct OperationLog {
    rooms: HashMap<RoomCode, Vec<DrawingOperation>>,
    max_operations_per_room: usize,
}

impl OperationLog {
    /// Create an empty log with the default per-room cap.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_OPERATIONS)
    }

    /// Create an empty log with an explicit per-room cap.
    pub fn with_limit(max_operations_per_room: usize) -> Self {
        Self { rooms: HashMap::new(), max_operations_per_room }
    }

    /// Insert or replace an operation in a room's sequence.
    ///
    /// A match on the derived key replaces in place, preserving the original
    /// insertion position. No match appends, subject to the per-room cap.
    /// Operations are expected to be pre-validated
    /// ([`DrawingOperation::validate`]); an operation without a derived key
    /// is appended.
    pub fn upsert(
        &mut self,
        room: &RoomCode,
        operation: DrawingOperation,
    ) -> Result<UpsertOutcome, CanvasError> {
        let ops = self.rooms.entry(room.clone()).or_default();

        if let Some(key) = operation.upsert_key() {
            if let Some(index) =
                ops.iter().position(|existing| existing.upsert_key().as_ref() == Some(&key))
            {
                ops[index] = operation;
                return Ok(UpsertOutcome::Replaced { index });
            }
        }

        if ops.len() >= self.max_operations_per_room {
            return Err(CanvasError::RoomFull {
                room: room.clone(),
                limit: self.max_operations_per_room,
            });
        }

        ops.push(operation);
        Ok(UpsertOutcome::Inserted)
    }

    /// Empty a room's sequence. Returns `true` if the room had any state.
    ///
    /// Idempotent: clearing an already-empty or unknown room is a no-op.
    pub fn clear(&mut self, room: &RoomCode) -> bool {
        match self.rooms.remove(room) {
            Some(ops) => !ops.is_empty(),
            None => false,
        }
    }

    /// Ordered copy of a room's sequence, for late joiners and persistence.
    ///
    /// Unknown rooms yield an empty sequence.
    pub fn snapshot(&self, room: &RoomCode) -> Vec<DrawingOperation> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Reinstall a persisted canvas, replacing any in-memory state.
    ///
    /// Used during server recovery, before connections are accepted.
    pub fn restore(&mut self, room: RoomCode, operations: Vec<DrawingOperation>) {
        if operations.is_empty() {
            self.rooms.remove(&room);
        } else {
            self.rooms.insert(room, operations);
        }
    }

    /// Number of operations currently held for a room.
    pub fn operation_count(&self, room: &RoomCode) -> usize {
        self.rooms.get(room).map_or(0, Vec::len)
    }

    /// Number of rooms with at least one operation.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use slate_proto::Point;

    use super::*;

    fn room() -> RoomCode {
        RoomCode::parse("ABC123").expect("valid code")
    }

    fn stroke(start: Point, extra: &[Point]) -> DrawingOperation {
        let mut points = vec![start];
        points.extend_from_slice(extra);
        DrawingOperation::FreehandStroke {
            id: None,
            color: "#112233".to_string(),
            width: 2.0,
            points,
        }
    }

    #[test]
    fn first_send_appends() {
        let mut log = OperationLog::new();

        let outcome = log.upsert(&room(), stroke(Point::new(1.0, 1.0), &[])).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(log.operation_count(&room()), 1);
    }

    #[test]
    fn growing_stroke_replaces_in_place() {
        let mut log = OperationLog::new();
        let start = Point::new(1.0, 1.0);

        log.upsert(&room(), stroke(start, &[Point::new(2.0, 2.0), Point::new(3.0, 3.0)]))
            .unwrap();
        log.upsert(&room(), stroke(Point::new(9.0, 9.0), &[])).unwrap();

        // Resend the first stroke grown to 7 points
        let grown: Vec<Point> = (0..6).map(|i| Point::new(2.0 + i as f32, 2.0)).collect();
        let outcome = log.upsert(&room(), stroke(start, &grown)).unwrap();

        assert_eq!(outcome, UpsertOutcome::Replaced { index: 0 });
        assert_eq!(log.operation_count(&room()), 2);

        let snapshot = log.snapshot(&room());
        match &snapshot[0] {
            DrawingOperation::FreehandStroke { points, .. } => assert_eq!(points.len(), 7),
            other => panic!("unexpected operation: {other:?}"),
        }
    }

    #[test]
    fn distinct_start_points_coexist() {
        let mut log = OperationLog::new();

        log.upsert(&room(), stroke(Point::new(1.0, 1.0), &[])).unwrap();
        log.upsert(&room(), stroke(Point::new(2.0, 1.0), &[])).unwrap();
        log.upsert(&room(), stroke(Point::new(1.0, 2.0), &[])).unwrap();

        assert_eq!(log.operation_count(&room()), 3);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut log = OperationLog::new();
        log.upsert(&room(), stroke(Point::new(1.0, 1.0), &[])).unwrap();

        assert!(log.clear(&room()));
        assert_eq!(log.operation_count(&room()), 0);

        // Second clear observes the same empty state
        assert!(!log.clear(&room()));
        assert_eq!(log.operation_count(&room()), 0);
    }

    #[test]
    fn rooms_are_isolated() {
        let mut log = OperationLog::new();
        let other = RoomCode::parse("XYZ789").unwrap();

        log.upsert(&room(), stroke(Point::new(1.0, 1.0), &[])).unwrap();
        log.upsert(&other, stroke(Point::new(1.0, 1.0), &[])).unwrap();

        log.clear(&room());
        assert_eq!(log.operation_count(&room()), 0);
        assert_eq!(log.operation_count(&other), 1);
    }

    #[test]
    fn cap_rejects_append_but_allows_replace() {
        let mut log = OperationLog::with_limit(2);

        log.upsert(&room(), stroke(Point::new(1.0, 1.0), &[])).unwrap();
        log.upsert(&room(), stroke(Point::new(2.0, 2.0), &[])).unwrap();

        let result = log.upsert(&room(), stroke(Point::new(3.0, 3.0), &[]));
        assert!(matches!(result, Err(CanvasError::RoomFull { limit: 2, .. })));

        // Replacing an existing stroke still works at capacity
        let outcome =
            log.upsert(&room(), stroke(Point::new(1.0, 1.0), &[Point::new(4.0, 4.0)])).unwrap();
        assert_eq!(outcome, UpsertOutcome::Replaced { index: 0 });
    }

    #[test]
    fn restore_replaces_state() {
        let mut log = OperationLog::new();
        log.upsert(&room(), stroke(Point::new(1.0, 1.0), &[])).unwrap();

        let persisted = vec![
            stroke(Point::new(5.0, 5.0), &[]),
            stroke(Point::new(6.0, 6.0), &[]),
        ];
        log.restore(room(), persisted.clone());

        assert_eq!(log.snapshot(&room()), persisted);
    }

    #[test]
    fn snapshot_of_unknown_room_is_empty() {
        let log = OperationLog::new();
        assert!(log.snapshot(&room()).is_empty());
    }
}
