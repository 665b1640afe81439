//! Allow-list of local users permitted to use the daemon.
//!
//! Membership is checked against the peer credentials of the Unix socket
//! connection, so a client cannot claim an identity it doesn't have.

use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("invalid user id '{0}' in allow-list")]
    InvalidUid(String),

    #[error("allow-list is empty")]
    Empty,
}

/// Set of uids allowed to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    allowed: BTreeSet<u32>,
}

impl AccessPolicy {
    pub fn new(allowed: impl IntoIterator<Item = u32>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Parses a comma-separated uid list such as `"1000, 1001"`.
    ///
    /// # Errors
    ///
    /// `AccessError::InvalidUid` for a non-numeric entry and
    /// `AccessError::Empty` if no uid remains.
    pub fn from_list(list: &str) -> Result<Self, AccessError> {
        let allowed = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .parse::<u32>()
                    .map_err(|_| AccessError::InvalidUid(entry.to_string()))
            })
            .collect::<Result<BTreeSet<u32>, _>>()?;

        if allowed.is_empty() {
            return Err(AccessError::Empty);
        }
        Ok(Self { allowed })
    }

    /// Only the user the daemon runs as.
    pub fn only_current_user() -> Self {
        // SAFETY: getuid has no preconditions and cannot fail
        let uid = unsafe { libc::getuid() };
        Self::new([uid])
    }

    /// Unknown peers (no credentials) are never allowed.
    pub fn is_allowed(&self, uid: Option<u32>) -> bool {
        uid.is_some_and(|uid| self.allowed.contains(&uid))
    }

    pub fn uids(&self) -> impl Iterator<Item = u32> + '_ {
        self.allowed.iter().copied()
    }
}
