//! Registry actor - owns the target map and persists every change.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A failed save rolls the in-memory change back, so memory and disk
//!   never disagree after a reported error
//! - Response send failures are ignored (the caller went away)

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wol_core::Target;

use super::commands::{RegistryCommand, RegistryError, Upserted};
use super::store::{TargetMap, TargetStore};

/// The registry actor - single owner of the target map.
///
/// Commands are processed sequentially, so a save never races another
/// mutation.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    targets: TargetMap,
    store: TargetStore,
}

impl RegistryActor {
    /// Creates an actor over already loaded contents.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        targets: TargetMap,
        store: TargetStore,
    ) -> Self {
        Self {
            receiver,
            targets,
            store,
        }
    }

    /// Runs the actor event loop until every handle is dropped.
    pub async fn run(mut self) {
        info!(targets = self.targets.len(), "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(targets = self.targets.len(), "Registry actor stopped");
    }

    async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Upsert { target, respond_to } => {
                let result = self.handle_upsert(target).await;
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove { name, respond_to } => {
                let result = self.handle_remove(name).await;
                let _ = respond_to.send(result);
            }
            RegistryCommand::Get { name, respond_to } => {
                let target = self
                    .targets
                    .get(&name)
                    .map(|record| Target::from_record(name.clone(), *record));
                let _ = respond_to.send(target);
            }
            RegistryCommand::List { respond_to } => {
                let _ = respond_to.send(self.list());
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.targets.clone());
            }
        }
    }

    async fn handle_upsert(&mut self, target: Target) -> Result<Upserted, RegistryError> {
        let previous = self.targets.insert(target.name.clone(), target.record());

        if let Err(e) = self.store.save(&self.targets).await {
            match previous {
                Some(record) => self.targets.insert(target.name.clone(), record),
                None => self.targets.remove(&target.name),
            };
            warn!(target = %target.name, error = %e, "Upsert rolled back");
            return Err(e.into());
        }

        let replaced = previous.is_some();
        info!(
            target = %target.name,
            mac = %target.mac,
            ip = %target.ip,
            replaced,
            "Target saved"
        );
        Ok(Upserted { replaced })
    }

    async fn handle_remove(&mut self, name: String) -> Result<Target, RegistryError> {
        let record = self
            .targets
            .remove(&name)
            .ok_or_else(|| RegistryError::NotFound(name.clone()))?;

        if let Err(e) = self.store.save(&self.targets).await {
            self.targets.insert(name.clone(), record);
            warn!(target = %name, error = %e, "Remove rolled back");
            return Err(e.into());
        }

        info!(target = %name, "Target removed");
        Ok(Target::from_record(name, record))
    }

    fn list(&self) -> Vec<Target> {
        debug!(count = self.targets.len(), "Listing targets");
        // BTreeMap iterates in name order
        self.targets
            .iter()
            .map(|(name, record)| Target::from_record(name.clone(), *record))
            .collect()
    }
}
