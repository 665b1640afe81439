//! wol client - Library modules
//!
//! Talks to the `wold` daemon over its Unix socket.
//!
//! # Architecture
//!
//! 1. **daemon**: finds a running daemon through its PID file and starts one if needed
//! 2. **client**: handshake, request/response calls and wake session following
//! 3. **cli**: argument parsing and human readable output
//!
//! The client never sends packets or probes hosts itself; every wake runs
//! inside the daemon so it survives the client exiting.

pub mod cli;
pub mod client;
pub mod daemon;
pub mod error;

// Re-export commonly used types
pub use client::{ClientConfig, DaemonClient, WakeReport};
pub use error::{CliError, Result};
