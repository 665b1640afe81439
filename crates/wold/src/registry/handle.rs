//! Client interface for interacting with the RegistryActor.
//!
//! # Panic-Free Guarantees
//!
//! Channel errors are mapped to `RegistryError::ChannelClosed`, or to an
//! empty/`None` result for read-only queries.

use tokio::sync::{mpsc, oneshot};

use wol_core::Target;

use super::commands::{RegistryCommand, RegistryError, Upserted};
use super::store::TargetMap;

/// Handle for interacting with the registry actor.
///
/// Cheap to clone and shareable across tasks.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Add a target, or replace the one with the same name.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Store` if the registry could not be saved
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn upsert(&self, target: Target) -> Result<Upserted, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Upsert {
                target,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a target by name, returning what was removed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if no target has this name
    /// - `RegistryError::Store` if the registry could not be saved
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn remove(&self, name: &str) -> Result<Target, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove {
                name: name.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Look up one target.
    ///
    /// Returns `None` if it doesn't exist or the actor is gone.
    pub async fn get(&self, name: &str) -> Option<Target> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Get {
                name: name.to_string(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// All targets sorted by name; empty if the actor is gone.
    pub async fn list(&self) -> Vec<Target> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::List { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Copy of the registry mapping; later edits do not affect it.
    pub async fn snapshot(&self) -> TargetMap {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return TargetMap::new();
        }

        rx.await.unwrap_or_default()
    }
}
