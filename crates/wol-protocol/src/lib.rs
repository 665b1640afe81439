//! wol Protocol - Wire protocol for daemon communication
//!
//! Clients and the daemon exchange newline-delimited JSON messages over a
//! Unix socket. Every client message carries the protocol version; the
//! daemon answers the `connect` handshake with `connected` or `rejected`.

pub mod message;
pub mod version;

pub use message::{error_code, ClientMessage, DaemonMessage, MessageType, StartedSession};
pub use version::{ProtocolVersion, VersionError};
