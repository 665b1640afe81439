//! Wake targets: named machines with a MAC and an IPv4 address.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::validate::{validate_ip, validate_mac};

/// A MAC-48 hardware address.
///
/// Accepts colon or hyphen separated input and always displays as
/// upper-case, colon separated pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Creates a MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Parses a MAC address string.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidMac` if `s` fails [`validate_mac`].
    pub fn parse(s: &str) -> DomainResult<Self> {
        let invalid = || DomainError::InvalidMac {
            value: s.to_string(),
        };

        if !validate_mac(s) {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (slot, pair) in bytes.iter_mut().zip(s.split([':', '-'])) {
            *slot = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }

    /// Returns the raw address bytes.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Parses a dotted IPv4 string that passes [`validate_ip`].
///
/// # Errors
///
/// Returns `DomainError::InvalidIp` for anything else.
pub fn parse_ipv4(s: &str) -> DomainResult<Ipv4Addr> {
    let invalid = || DomainError::InvalidIp {
        value: s.to_string(),
    };

    if !validate_ip(s) {
        return Err(invalid());
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(s.split('.')) {
        *slot = part.parse().map_err(|_| invalid())?;
    }
    Ok(Ipv4Addr::from(octets))
}

/// Registry value stored per target name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
}

/// A named machine that can be woken.
///
/// Sessions hold their own copy, so registry edits made while a wake is
/// in progress never affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique, case-sensitive registry key
    pub name: String,
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
}

impl Target {
    /// Creates a target from already validated parts.
    pub fn new(name: impl Into<String>, mac: MacAddress, ip: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            mac,
            ip,
        }
    }

    /// Validates and builds a target from user supplied strings.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidName` if the name is empty or contains whitespace
    /// - `DomainError::InvalidMac` / `DomainError::InvalidIp` on bad addresses
    pub fn parse(name: &str, mac: &str, ip: &str) -> DomainResult<Self> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidName {
                value: name.to_string(),
            });
        }
        Ok(Self::new(name, MacAddress::parse(mac)?, parse_ipv4(ip)?))
    }

    /// Builds a target from a registry entry.
    pub fn from_record(name: impl Into<String>, record: TargetRecord) -> Self {
        Self::new(name, record.mac, record.ip)
    }

    /// Returns the registry value for this target.
    pub fn record(&self) -> TargetRecord {
        TargetRecord {
            mac: self.mac,
            ip: self.ip,
        }
    }
}

/// Result of a one-shot reachability check of a registered target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub name: String,
    pub ip: Ipv4Addr,
    pub online: bool,
}
