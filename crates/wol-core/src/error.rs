//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// MAC address is not six uniformly separated hex pairs
    #[error("Invalid MAC address: {value} (expected XX:XX:XX:XX:XX:XX or XX-XX-XX-XX-XX-XX)")]
    InvalidMac { value: String },

    /// IP address is not a dotted IPv4 quad
    #[error("Invalid IP address: {value} (expected four octets 0-255)")]
    InvalidIp { value: String },

    /// Target name is empty or contains whitespace
    #[error("Invalid target name: {value:?}")]
    InvalidName { value: String },

    /// Configuration value rejected at startup
    #[error("Invalid {key}: {value} (expected {expected})")]
    InvalidConfig {
        key: String,
        value: String,
        expected: String,
    },

    /// Reading or writing a configuration file failed
    #[error("Failed to access {path}: {reason}")]
    ConfigIo { path: String, reason: String },
}

impl DomainError {
    pub(crate) fn invalid_config(key: &str, value: impl Into<String>, expected: &str) -> Self {
        Self::InvalidConfig {
            key: key.to_string(),
            value: value.into(),
            expected: expected.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
