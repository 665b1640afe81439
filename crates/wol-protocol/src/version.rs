//! Protocol versioning.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol version as `major.minor`.
///
/// Only the major version decides compatibility; minor bumps are additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Current protocol version.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parses a version string like "1.0".
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidFormat(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }

    /// Checks that a peer speaking `other` can talk to us.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::Incompatible` when the major versions differ.
    pub fn check_compatible(&self, other: &ProtocolVersion) -> Result<(), VersionError> {
        if self.major == other.major {
            Ok(())
        } else {
            Err(VersionError::Incompatible {
                got: other.to_string(),
                expected: self.to_string(),
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Errors that can occur with version handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    #[error("Incompatible version: got {got}, expected {expected}")]
    Incompatible { got: String, expected: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!(ProtocolVersion::parse("1.3").unwrap(), ProtocolVersion::new(1, 3));
        assert!(ProtocolVersion::parse("1").is_err());
        assert!(ProtocolVersion::parse("1.0.0").is_err());
        assert!(ProtocolVersion::parse("a.b").is_err());
    }

    #[test]
    fn test_compatibility_is_major_only() {
        let current = ProtocolVersion::CURRENT;
        assert!(current.check_compatible(&ProtocolVersion::new(1, 9)).is_ok());

        let err = current.check_compatible(&ProtocolVersion::new(2, 0)).unwrap_err();
        assert_eq!(err.to_string(), "Incompatible version: got 2.0, expected 1.0");
    }
}
