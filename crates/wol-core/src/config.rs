//! Wake policy configuration.
//!
//! `WakeConfig` is built once at startup and shared read-only with the
//! coordinator and every session. Values come from environment-style
//! `KEY=VALUE` pairs; the lookup is injectable so tests never touch the
//! process environment.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};

/// Environment key for the poll loop budget.
pub const MAX_TRIES_KEY: &str = "MAX_TRIES";
/// Environment key for the wait between probes, in seconds.
pub const CHECK_INTERVAL_KEY: &str = "CHECK_INTERVAL";
/// Environment key for the resend period, in attempts.
pub const RESEND_EVERY_KEY: &str = "RESEND_EVERY";
/// Environment key for the probe timeout, in seconds.
pub const PROBE_TIMEOUT_KEY: &str = "PROBE_TIMEOUT";
/// Environment key for the magic packet destination address.
pub const BROADCAST_KEY: &str = "WOL_BROADCAST";
/// Environment key for the magic packet destination port.
pub const PORT_KEY: &str = "WOL_PORT";

/// Default values written by [`ensure_env_defaults`].
pub const ENV_DEFAULTS: &[(&str, &str)] = &[
    (MAX_TRIES_KEY, "30"),
    (CHECK_INTERVAL_KEY, "10"),
    (RESEND_EVERY_KEY, "3"),
    (PROBE_TIMEOUT_KEY, "2"),
    (BROADCAST_KEY, "255.255.255.255"),
    (PORT_KEY, "9"),
];

/// Conventional Wake-on-LAN discard port.
pub const DEFAULT_WOL_PORT: u16 = 9;

/// Immutable wake-and-verify policy.
#[derive(Debug, Clone, PartialEq)]
pub struct WakeConfig {
    /// Maximum number of poll loop attempts per session
    pub max_tries: u32,

    /// Wait between consecutive probes in the poll loop
    pub check_interval: Duration,

    /// Every Nth attempt re-sends the magic packet
    pub resend_every: u32,

    /// Upper bound on a single reachability probe
    pub probe_timeout: Duration,

    /// Destination address for magic packets
    pub broadcast: Ipv4Addr,

    /// Destination UDP port for magic packets
    pub port: u16,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            max_tries: 30,
            check_interval: Duration::from_secs(10),
            resend_every: 3,
            probe_timeout: Duration::from_secs(2),
            broadcast: Ipv4Addr::BROADCAST,
            port: DEFAULT_WOL_PORT,
        }
    }
}

impl WakeConfig {
    /// Builds a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` for any value that fails to parse
    /// or violates its bounds.
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Missing keys fall back to [`WakeConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` for any value that fails to parse
    /// or violates its bounds.
    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_tries = match lookup(MAX_TRIES_KEY) {
            Some(raw) => parse_positive_int(MAX_TRIES_KEY, &raw)?,
            None => defaults.max_tries,
        };
        let check_interval = match lookup(CHECK_INTERVAL_KEY) {
            Some(raw) => parse_seconds(CHECK_INTERVAL_KEY, &raw)?,
            None => defaults.check_interval,
        };
        let resend_every = match lookup(RESEND_EVERY_KEY) {
            Some(raw) => parse_positive_int(RESEND_EVERY_KEY, &raw)?,
            None => defaults.resend_every,
        };
        let probe_timeout = match lookup(PROBE_TIMEOUT_KEY) {
            Some(raw) => parse_seconds(PROBE_TIMEOUT_KEY, &raw)?,
            None => defaults.probe_timeout.min(check_interval / 2),
        };
        let broadcast = match lookup(BROADCAST_KEY) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                DomainError::invalid_config(BROADCAST_KEY, raw.clone(), "an IPv4 address")
            })?,
            None => defaults.broadcast,
        };
        let port = match lookup(PORT_KEY) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| DomainError::invalid_config(PORT_KEY, raw.clone(), "a port 1-65535"))?,
            None => defaults.port,
        };

        let config = Self {
            max_tries,
            check_interval,
            resend_every,
            probe_timeout,
            broadcast,
            port,
        };
        config.validate()?;

        debug!(?config, "Wake configuration loaded");
        Ok(config)
    }

    /// Checks cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` if a count is zero or the probe
    /// timeout is not strictly shorter than the check interval.
    pub fn validate(&self) -> DomainResult<()> {
        if self.max_tries == 0 {
            return Err(DomainError::invalid_config(MAX_TRIES_KEY, "0", "a positive integer"));
        }
        if self.resend_every == 0 {
            return Err(DomainError::invalid_config(RESEND_EVERY_KEY, "0", "a positive integer"));
        }
        if self.check_interval.is_zero() {
            return Err(DomainError::invalid_config(CHECK_INTERVAL_KEY, "0", "a positive number of seconds"));
        }
        if self.probe_timeout.is_zero() || self.probe_timeout >= self.check_interval {
            return Err(DomainError::invalid_config(
                PROBE_TIMEOUT_KEY,
                format!("{}", self.probe_timeout.as_secs_f64()),
                "a positive number of seconds below CHECK_INTERVAL",
            ));
        }
        Ok(())
    }

    /// Returns true if the given (post-increment) attempt should re-send the packet.
    pub fn is_resend_attempt(&self, attempt: u32) -> bool {
        self.resend_every > 0 && attempt % self.resend_every == 0
    }

    /// Total time a session may spend in the poll loop, ignoring probe latency.
    pub fn polling_budget(&self) -> Duration {
        self.check_interval.saturating_mul(self.max_tries)
    }
}

fn parse_positive_int(key: &str, raw: &str) -> DomainResult<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| DomainError::invalid_config(key, raw, "a positive integer"))
}

fn parse_seconds(key: &str, raw: &str) -> DomainResult<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| DomainError::invalid_config(key, raw, "a positive number of seconds"))
}

/// Reads a `.env` style file into a map, without touching the process
/// environment.
///
/// Parsing follows `dotenvy`: comments, `export ` prefixes and quoted values
/// are understood. Lines that do not parse are skipped with a warning. A
/// missing file yields an empty map.
///
/// # Errors
///
/// Returns `DomainError::ConfigIo` if the file exists but cannot be read.
pub fn read_env_file(path: &Path) -> DomainResult<HashMap<String, String>> {
    let io_err = |e: dotenvy::Error| DomainError::ConfigIo {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut vars = HashMap::new();
    for entry in entries {
        match entry {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e @ dotenvy::Error::LineParse(..)) => {
                warn!(path = %path.display(), error = %e, "Skipping unparsable env line");
            }
            Err(e) => return Err(io_err(e)),
        }
    }
    Ok(vars)
}

/// Appends every missing key of [`ENV_DEFAULTS`] to a `.env` file.
///
/// The file is created if absent. Existing keys are never overwritten.
/// Returns the keys that were added.
///
/// # Errors
///
/// Returns `DomainError::ConfigIo` if the file cannot be read or written.
pub fn ensure_env_defaults(path: &Path) -> DomainResult<Vec<&'static str>> {
    let io_err = |e: std::io::Error| DomainError::ConfigIo {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let existing = read_env_file(path)?;
    let missing: Vec<(&'static str, &'static str)> = ENV_DEFAULTS
        .iter()
        .filter(|(key, _)| !existing.contains_key(*key))
        .copied()
        .collect();

    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let needs_newline = fs::read(path)
        .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
        .unwrap_or(false);

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;

    if needs_newline {
        writeln!(file).map_err(io_err)?;
    }
    for (key, value) in &missing {
        writeln!(file, "{key}={value}").map_err(io_err)?;
    }

    Ok(missing.into_iter().map(|(key, _)| key).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WakeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, WakeConfig::default());
        assert_eq!(config.max_tries, 30);
        assert_eq!(config.check_interval, Duration::from_secs(10));
        assert_eq!(config.resend_every, 3);
        assert_eq!(config.polling_budget(), Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = WakeConfig::from_lookup(lookup_from(&[
            ("MAX_TRIES", "6"),
            ("CHECK_INTERVAL", "2.5"),
            ("RESEND_EVERY", "2"),
            ("PROBE_TIMEOUT", "1"),
            ("WOL_BROADCAST", "192.168.1.255"),
            ("WOL_PORT", "7"),
        ]))
        .unwrap();

        assert_eq!(config.max_tries, 6);
        assert_eq!(config.check_interval, Duration::from_millis(2500));
        assert_eq!(config.resend_every, 2);
        assert_eq!(config.probe_timeout, Duration::from_secs(1));
        assert_eq!(config.broadcast, Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(config.port, 7);
    }

    #[test]
    fn test_short_interval_shrinks_default_probe_timeout() {
        let config = WakeConfig::from_lookup(lookup_from(&[("CHECK_INTERVAL", "1")])).unwrap();
        assert_eq!(config.probe_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_invalid_values() {
        for (key, value) in [
            ("MAX_TRIES", "0"),
            ("MAX_TRIES", "-1"),
            ("MAX_TRIES", "many"),
            ("CHECK_INTERVAL", "0"),
            ("CHECK_INTERVAL", "nan"),
            ("RESEND_EVERY", "0"),
            ("WOL_PORT", "0"),
            ("WOL_BROADCAST", "not-an-ip"),
        ] {
            let result = WakeConfig::from_lookup(lookup_from(&[(key, value)]));
            assert!(
                matches!(result, Err(DomainError::InvalidConfig { .. })),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_probe_timeout_must_be_below_interval() {
        let result = WakeConfig::from_lookup(lookup_from(&[
            ("CHECK_INTERVAL", "2"),
            ("PROBE_TIMEOUT", "2"),
        ]));
        assert!(matches!(result, Err(DomainError::InvalidConfig { key, .. }) if key == "PROBE_TIMEOUT"));
    }

    #[test]
    fn test_resend_attempts() {
        let config = WakeConfig::default();
        let resends: Vec<u32> = (1..=10).filter(|a| config.is_resend_attempt(*a)).collect();
        assert_eq!(resends, vec![3, 6, 9]);
    }

    #[test]
    fn test_read_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# comment\nMAX_TRIES=12\n\nexport CHECK_INTERVAL=\"4\"\nCOMPUTERS_FILE='pcs.json'\nbroken line\n",
        )
        .unwrap();

        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get("MAX_TRIES").map(String::as_str), Some("12"));
        assert_eq!(vars.get("CHECK_INTERVAL").map(String::as_str), Some("4"));
        assert_eq!(vars.get("COMPUTERS_FILE").map(String::as_str), Some("pcs.json"));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_read_env_file_leaves_process_env_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "WOL_READ_ONLY_CHECK=a=b\nWOL_READ_ONLY_CHECK=c=d\n").unwrap();

        let vars = read_env_file(&path).unwrap();
        // Later lines win, and `=` may appear in values
        assert_eq!(vars.get("WOL_READ_ONLY_CHECK").map(String::as_str), Some("c=d"));
        assert!(std::env::var("WOL_READ_ONLY_CHECK").is_err());
    }

    #[test]
    fn test_read_env_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("absent.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_ensure_env_defaults_appends_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "ALLOWED_USERS=1000\nMAX_TRIES=5").unwrap();

        let added = ensure_env_defaults(&path).unwrap();
        assert!(!added.contains(&"MAX_TRIES"));
        assert!(added.contains(&"CHECK_INTERVAL"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("ALLOWED_USERS=1000\n"));
        assert!(content.contains("MAX_TRIES=5\n"));
        assert!(!content.contains("MAX_TRIES=30"));
        for expected in ["CHECK_INTERVAL=10", "RESEND_EVERY=3", "PROBE_TIMEOUT=2", "WOL_PORT=9"] {
            assert!(content.contains(expected), "missing {expected}");
        }

        // Second run is a no-op
        assert!(ensure_env_defaults(&path).unwrap().is_empty());
    }

    #[test]
    fn test_ensure_env_defaults_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        let added = ensure_env_defaults(&path).unwrap();
        assert_eq!(added.len(), ENV_DEFAULTS.len());

        let config = WakeConfig::from_lookup(|key| {
            read_env_file(&path).ok().and_then(|vars| vars.get(key).cloned())
        })
        .unwrap();
        assert_eq!(config, WakeConfig::default());
    }
}
