//! wol Core - Shared types for Wake-on-LAN targets and sessions
//!
//! This crate provides the domain types shared between
//! the daemon (wold) and the command line client (wol).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod error;
pub mod event;
pub mod target;
pub mod validate;

// Re-exports for convenience
pub use config::{ensure_env_defaults, read_env_file, WakeConfig, ENV_DEFAULTS};
pub use error::{DomainError, DomainResult};
pub use event::{Notification, SessionId, WakeEvent};
pub use target::{parse_ipv4, MacAddress, Target, TargetRecord, TargetStatus};
pub use validate::{validate_ip, validate_mac};
