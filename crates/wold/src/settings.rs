//! Daemon settings.
//!
//! Every key is looked up in the process environment first, then in the
//! optional `.env` file. Settings are resolved once, before daemonizing, so
//! configuration errors reach the terminal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use wol_core::{read_env_file, DomainError, WakeConfig};

use crate::server::{AccessError, AccessPolicy, DEFAULT_SOCKET_PATH};

/// Environment key for the Unix socket path.
pub const SOCKET_KEY: &str = "WOL_SOCKET";
/// Environment key for the registry file.
pub const COMPUTERS_FILE_KEY: &str = "COMPUTERS_FILE";
/// Environment key for the comma-separated uid allow-list.
pub const ALLOWED_USERS_KEY: &str = "ALLOWED_USERS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] DomainError),

    #[error("{ALLOWED_USERS_KEY}: {0}")]
    Access(#[from] AccessError),
}

/// Everything the daemon needs at startup.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub socket_path: PathBuf,
    pub computers_file: PathBuf,
    pub access: AccessPolicy,
    pub wake: WakeConfig,
}

impl DaemonSettings {
    /// Resolves settings from the environment and `env_file`.
    ///
    /// A missing `env_file` is the same as an empty one.
    pub fn load(env_file: &Path) -> Result<Self, SettingsError> {
        let file_values = read_env_file(env_file)?;
        debug!(
            env_file = %env_file.display(),
            keys = file_values.len(),
            "Read env file"
        );
        Self::from_lookup(env_then_file(file_values))
    }

    /// Resolves settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let socket_path = lookup(SOCKET_KEY)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));

        let computers_file = lookup(COMPUTERS_FILE_KEY)
            .map(PathBuf::from)
            .unwrap_or_else(default_computers_file);

        let access = match lookup(ALLOWED_USERS_KEY) {
            Some(list) => AccessPolicy::from_list(&list)?,
            None => AccessPolicy::only_current_user(),
        };

        Ok(Self {
            socket_path,
            computers_file,
            access,
            wake: WakeConfig::from_lookup(&lookup)?,
        })
    }
}

/// Process environment first, then the values read from the env file.
fn env_then_file(file_values: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key| {
        std::env::var(key)
            .ok()
            .or_else(|| file_values.get(key).cloned())
    }
}

/// `<data dir>/wol/computers.json`, or under `/tmp` without a data dir.
pub fn default_computers_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("wol")
        .join("computers.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = DaemonSettings::from_lookup(lookup(&[])).unwrap();

        assert_eq!(settings.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(settings.computers_file, default_computers_file());
        assert_eq!(settings.access, AccessPolicy::only_current_user());
        assert_eq!(settings.wake, WakeConfig::default());
    }

    #[test]
    fn test_overrides() {
        let settings = DaemonSettings::from_lookup(lookup(&[
            (SOCKET_KEY, "/run/wol.sock"),
            (COMPUTERS_FILE_KEY, "/var/lib/wol/computers.json"),
            (ALLOWED_USERS_KEY, "1000,1001"),
            ("MAX_TRIES", "5"),
            ("CHECK_INTERVAL", "4"),
        ]))
        .unwrap();

        assert_eq!(settings.socket_path, PathBuf::from("/run/wol.sock"));
        assert_eq!(
            settings.computers_file,
            PathBuf::from("/var/lib/wol/computers.json")
        );
        assert!(settings.access.is_allowed(Some(1001)));
        assert_eq!(settings.wake.max_tries, 5);
        assert_eq!(settings.wake.check_interval, Duration::from_secs(4));
    }

    #[test]
    fn test_bad_allow_list() {
        let err = DaemonSettings::from_lookup(lookup(&[(ALLOWED_USERS_KEY, "root")])).unwrap_err();
        assert!(matches!(err, SettingsError::Access(_)));
        assert!(err.to_string().starts_with(ALLOWED_USERS_KEY));
    }

    #[test]
    fn test_bad_wake_config() {
        let err = DaemonSettings::from_lookup(lookup(&[("MAX_TRIES", "0")])).unwrap_err();
        assert!(matches!(err, SettingsError::Config(_)));
    }

    #[test]
    fn test_load_reads_env_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        // Keys unlikely to be set in the test environment
        std::fs::write(&path, "RESEND_EVERY=7\n# comment\nWOL_PORT=7\n").unwrap();

        let settings = DaemonSettings::load(&path).unwrap();
        assert_eq!(settings.wake.resend_every, 7);
        assert_eq!(settings.wake.port, 7);
    }

    #[test]
    fn test_load_without_env_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(DaemonSettings::load(&dir.path().join("missing.env")).is_ok());
    }
}
