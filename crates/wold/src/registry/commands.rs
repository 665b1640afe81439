//! Registry actor commands and errors.
//!
//! All types are designed for async message passing and follow the
//! panic-free policy.

use thiserror::Error;
use tokio::sync::oneshot;

use wol_core::Target;

use super::store::{StoreError, TargetMap};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response.
///
/// ```ignore
/// let (tx, rx) = oneshot::channel();
/// registry_tx.send(RegistryCommand::Get {
///     name: "desktop".to_string(),
///     respond_to: tx,
/// }).await?;
/// let target = rx.await?;
/// ```
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert a target, replacing any target with the same name.
    ///
    /// # Errors
    /// - `RegistryError::Store` if the registry could not be persisted
    Upsert {
        target: Target,
        respond_to: oneshot::Sender<Result<Upserted, RegistryError>>,
    },

    /// Remove a target by name.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if no target has this name
    /// - `RegistryError::Store` if the registry could not be persisted
    Remove {
        name: String,
        respond_to: oneshot::Sender<Result<Target, RegistryError>>,
    },

    /// Look up one target.
    Get {
        name: String,
        respond_to: oneshot::Sender<Option<Target>>,
    },

    /// All targets, sorted by name.
    List {
        respond_to: oneshot::Sender<Vec<Target>>,
    },

    /// Copy of the raw registry mapping.
    Snapshot {
        respond_to: oneshot::Sender<TargetMap>,
    },
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    /// True if a target with the same name was overwritten
    pub replaced: bool,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No target with the requested name.
    #[error("no target named '{0}'")]
    NotFound(String),

    /// The change was rejected because it could not be persisted.
    #[error("registry not saved: {0}")]
    Store(#[from] StoreError),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::NotFound("desktop".to_string());
        assert_eq!(err.to_string(), "no target named 'desktop'");

        let err = RegistryError::ChannelClosed;
        assert_eq!(err.to_string(), "response channel closed");

        let err = RegistryError::from(StoreError::Write {
            path: PathBuf::from("/tmp/computers.json"),
            reason: "disk full".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "registry not saved: failed to write /tmp/computers.json: disk full"
        );
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<Upserted, RegistryError>>();
        drop(tx);

        assert!(rx.await.is_err());
    }
}
