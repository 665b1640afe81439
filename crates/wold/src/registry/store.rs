//! JSON file persistence for the target registry.
//!
//! File layout, pretty printed:
//!
//! ```json
//! {
//!   "desktop": { "mac": "00:11:22:33:44:55", "ip": "192.168.1.50" }
//! }
//! ```
//!
//! A missing file loads as an empty registry. A file that fails to parse is
//! renamed to `<file>.corrupt-<UTC timestamp>` and the registry starts empty;
//! its contents are never merged.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, warn};

use wol_core::TargetRecord;

/// Registry contents keyed by target name.
pub type TargetMap = BTreeMap<String, TargetRecord>;

/// Errors from reading or writing the registry file.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("failed to encode registry: {0}")]
    Encode(String),
}

/// Load/save collaborator for the registry file.
#[derive(Debug, Clone)]
pub struct TargetStore {
    path: PathBuf,
}

impl TargetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the registry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Read` only for I/O failures other than a missing
    /// file. Unparseable contents are moved aside and yield an empty map.
    pub async fn load(&self) -> Result<TargetMap, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Registry file not found, starting empty");
                return Ok(TargetMap::new());
            }
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        match serde_json::from_str::<TargetMap>(&contents) {
            Ok(map) => {
                debug!(path = %self.path.display(), targets = map.len(), "Registry loaded");
                Ok(map)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Registry file is corrupt");
                self.quarantine().await;
                Ok(TargetMap::new())
            }
        }
    }

    /// Writes the registry atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if the directory, temp file or rename fails.
    pub async fn save(&self, map: &TargetMap) -> Result<(), StoreError> {
        let json =
            serde_json::to_string_pretty(map).map_err(|e| StoreError::Encode(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        let tmp = self.sibling(".tmp");
        fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| self.write_error(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.write_error(e))?;

        debug!(path = %self.path.display(), targets = map.len(), "Registry saved");
        Ok(())
    }

    /// Moves a corrupt file out of the way. Failure is logged, not returned:
    /// the next save overwrites the file anyway.
    async fn quarantine(&self) {
        let suffix = format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
        let aside = self.sibling(&suffix);

        match fs::rename(&self.path, &aside).await {
            Ok(()) => warn!(
                path = %self.path.display(),
                moved_to = %aside.display(),
                "Corrupt registry moved aside, starting empty"
            ),
            Err(e) => error!(
                path = %self.path.display(),
                error = %e,
                "Failed to move corrupt registry aside, starting empty"
            ),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    fn write_error(&self, e: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}
