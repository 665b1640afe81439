//! Wake session identifiers and the events a session emits.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one wake session, unique within a daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a session ID from its sequence number.
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the sequence number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wake-{}", self.0)
    }
}

/// Progress and terminal events produced by a wake session.
///
/// Within one session `AlreadyOnline`, `SendFailed` or `PacketSent` always
/// comes first, and exactly one terminal event (`AlreadyOnline`,
/// `SendFailed`, `Online` or `Exhausted`) comes last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WakeEvent {
    /// Target answered the entry probe; no packet was sent
    AlreadyOnline { name: String },

    /// Initial magic packet transmitted
    PacketSent { name: String },

    /// Initial transmission failed; the session ends here
    SendFailed { name: String, error: String },

    /// Target answered a probe during polling
    Online { name: String, attempts: u32 },

    /// A periodic resend failed; polling continues
    ResendFailed {
        name: String,
        attempt: u32,
        error: String,
    },

    /// Polling budget used up without an answer
    Exhausted { name: String, attempts: u32 },
}

impl WakeEvent {
    /// Name of the target this event is about.
    pub fn name(&self) -> &str {
        match self {
            Self::AlreadyOnline { name }
            | Self::PacketSent { name }
            | Self::SendFailed { name, .. }
            | Self::Online { name, .. }
            | Self::ResendFailed { name, .. }
            | Self::Exhausted { name, .. } => name,
        }
    }

    /// Returns true if no further events follow for this session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyOnline { .. }
                | Self::SendFailed { .. }
                | Self::Online { .. }
                | Self::Exhausted { .. }
        )
    }

    /// Returns true if the target ended up reachable.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyOnline { .. } | Self::Online { .. })
    }
}

impl fmt::Display for WakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyOnline { name } => write!(f, "'{name}' is already online"),
            Self::PacketSent { name } => {
                write!(f, "Wake-on-LAN packet sent to '{name}', waiting for it to come up")
            }
            Self::SendFailed { name, error } => {
                write!(f, "Failed to send wake packet to '{name}': {error}")
            }
            Self::Online { name, attempts } => {
                write!(f, "'{name}' is online (after {attempts} checks)")
            }
            Self::ResendFailed {
                name,
                attempt,
                error,
            } => write!(f, "Resend to '{name}' failed at attempt {attempt}: {error}"),
            Self::Exhausted { name, attempts } => {
                write!(f, "'{name}' did not come online after {attempts} checks")
            }
        }
    }
}

/// A session event stamped with its session and emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub session_id: SessionId,
    pub at: DateTime<Utc>,
    pub event: WakeEvent,
}

impl Notification {
    /// Stamps an event with the current time.
    pub fn now(session_id: SessionId, event: WakeEvent) -> Self {
        Self {
            session_id,
            at: Utc::now(),
            event,
        }
    }
}
