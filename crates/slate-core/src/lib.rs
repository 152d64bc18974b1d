//! Runtime-free domain logic for the slate whiteboard broker.
//!
//! Everything in this crate is pure with respect to I/O: the operation log
//! mutates in-memory state and reports outcomes, the membership gate is a
//! predicate over already-loaded data, and the connection liveness machine
//! takes time as a parameter and returns actions for a driver to execute.
//! The [`env::Environment`] trait is the only seam to the outside world
//! (time and randomness), which keeps all of this deterministic under test.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod canvas;
pub mod connection;
pub mod env;
pub mod membership;

pub use canvas::{CanvasError, DEFAULT_MAX_OPERATIONS, OperationLog, UpsertOutcome};
pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_IDLE_TIMEOUT,
};
pub use env::Environment;
pub use membership::can_draw;
