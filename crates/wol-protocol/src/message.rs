//! Protocol message types for daemon communication.

use crate::version::ProtocolVersion;
use wol_core::{Notification, SessionId, Target, TargetStatus};
use serde::{Deserialize, Serialize};

/// Requests a client can send to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Handshake; must be the first message on a connection
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Add a target or replace the one with the same name
    AddTarget { name: String, mac: String, ip: String },

    /// Remove a target by name
    RemoveTarget { name: String },

    /// Request all registered targets
    ListTargets,

    /// Wake one registered target
    Wake { name: String },

    /// Wake every registered target
    WakeAll,

    /// One-shot reachability check of every registered target
    Status,

    /// Receive notifications from every session, not just our own
    Watch,

    /// Ping to check connection
    Ping { seq: u64 },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn add_target(name: &str, mac: &str, ip: &str) -> Self {
        Self::new(MessageType::AddTarget {
            name: name.to_string(),
            mac: mac.to_string(),
            ip: ip.to_string(),
        })
    }

    pub fn remove_target(name: &str) -> Self {
        Self::new(MessageType::RemoveTarget {
            name: name.to_string(),
        })
    }

    pub fn list_targets() -> Self {
        Self::new(MessageType::ListTargets)
    }

    pub fn wake(name: &str) -> Self {
        Self::new(MessageType::Wake {
            name: name.to_string(),
        })
    }

    pub fn wake_all() -> Self {
        Self::new(MessageType::WakeAll)
    }

    pub fn status() -> Self {
        Self::new(MessageType::Status)
    }

    pub fn watch() -> Self {
        Self::new(MessageType::Watch)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Machine-readable codes carried by `DaemonMessage::Error`.
pub mod error_code {
    /// `add_target` with a malformed name, MAC or IP
    pub const INVALID_TARGET: &str = "invalid_target";
    /// The named target is not registered
    pub const UNKNOWN_TARGET: &str = "unknown_target";
    /// The registry change could not be saved
    pub const REGISTRY: &str = "registry";
}

/// A session the daemon started on behalf of a wake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub name: String,
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Connection rejected (version mismatch, not on the allow-list)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Target stored; `replaced` is true if the name already existed
    TargetAdded { name: String, replaced: bool },

    /// Target deleted
    TargetRemoved { name: String },

    /// All registered targets, sorted by name
    TargetList { targets: Vec<Target> },

    /// Wake sessions were spawned; notifications follow asynchronously
    WakeStarted { sessions: Vec<StartedSession> },

    /// A wake-all request found no registered targets
    NothingToWake,

    /// Progress or terminal event of a wake session
    Notification { notification: Notification },

    /// Result of a one-shot status check
    StatusReport { statuses: Vec<TargetStatus> },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Error response
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn target_added(name: String, replaced: bool) -> Self {
        Self::TargetAdded { name, replaced }
    }

    pub fn target_removed(name: String) -> Self {
        Self::TargetRemoved { name }
    }

    pub fn target_list(targets: Vec<Target>) -> Self {
        Self::TargetList { targets }
    }

    pub fn wake_started(sessions: Vec<StartedSession>) -> Self {
        Self::WakeStarted { sessions }
    }

    pub fn notification(notification: Notification) -> Self {
        Self::Notification { notification }
    }

    pub fn status_report(statuses: Vec<TargetStatus>) -> Self {
        Self::StatusReport { statuses }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}
