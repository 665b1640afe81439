//! Error types for the wol client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors raised while talking to the wol daemon.
///
/// Connection errors suggest checking whether the daemon is running,
/// `Daemon` carries the daemon's own error message and code.
#[derive(Error, Debug)]
pub enum CliError {
    /// Could not reach the daemon socket.
    #[error("Failed to connect to daemon: {0}")]
    DaemonConnection(String),

    /// The daemon could not be started automatically.
    #[error("Failed to start daemon: {0}")]
    DaemonStart(String),

    /// The daemon refused the handshake (allow-list, version).
    #[error("Daemon rejected the connection: {0}")]
    Rejected(String),

    /// Protocol version mismatch with the daemon.
    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version})")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
    },

    /// The daemon answered a request with an error.
    #[error("{message}")]
    Daemon {
        message: String,
        code: Option<String>,
    },

    /// The daemon sent something that does not fit the conversation.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The daemon closed the connection.
    #[error("Daemon closed the connection")]
    ConnectionClosed,

    /// No response within the allowed time.
    #[error("Timed out waiting for the daemon")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl CliError {
    /// Machine-readable code of a daemon error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Daemon { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, CliError>;

// ============================================================================
// Tests
// ============================================================================
