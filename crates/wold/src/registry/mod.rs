//! Target registry using the Actor pattern.
//!
//! The registry maps target names to `{mac, ip}` and is the only writer of
//! the registry file. Wake requests read snapshots from it; sessions never
//! see later edits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐ RegistryCommand ┌─────────────────┐  save   ┌──────────────┐
//! │   Connections   │────────────────▶│  RegistryActor  │────────▶│ TargetStore  │
//! └─────────────────┘  (mpsc channel) └─────────────────┘         └──────────────┘
//!                                     BTreeMap<name, TargetRecord>  computers.json
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod store;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError, Upserted};
pub use handle::RegistryHandle;
pub use store::{StoreError, TargetMap, TargetStore};

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Load the registry from `store`, spawn its actor and return a handle.
///
/// # Errors
///
/// Returns `StoreError::Read` if the file exists but cannot be read. A
/// missing or corrupt file is not an error.
///
/// # Example
///
/// ```no_run
/// use wold::registry::{spawn_registry, TargetStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = spawn_registry(TargetStore::new("/tmp/computers.json")).await?;
///     let targets = handle.list().await;
///     Ok(())
/// }
/// ```
pub async fn spawn_registry(store: TargetStore) -> Result<RegistryHandle, StoreError> {
    let targets = store.load().await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = RegistryActor::new(cmd_rx, targets, store);
    tokio::spawn(actor.run());

    Ok(RegistryHandle::new(cmd_tx))
}
