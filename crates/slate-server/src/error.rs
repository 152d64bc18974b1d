//! Server error types.
//!
//! Errors at this level are about running the broker (configuration,
//! transport, runtime plumbing); per-event failures live in
//! [`crate::driver::RelayError`] and are scoped to a single connection.

use thiserror::Error;

use crate::{driver::RelayError, storage::StorageError};

/// Errors that can occur in the server runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, missing TLS certs, etc.).
    ///
    /// Fatal: fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (connection failure, I/O error, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol error (undecodable event, oversized frame, etc.).
    ///
    /// Fatal for the offending connection; the server keeps serving others.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Relay error from driver processing.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Storage error outside the best-effort persistence path.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal error (closed control channel, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<slate_proto::ProtocolError> for ServerError {
    fn from(err: slate_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
