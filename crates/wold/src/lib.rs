//! wol daemon - target registry, wake sessions and notification server
//!
//! - `registry` - Target registry actor backed by a JSON file
//! - `wake` - Magic packets, reachability probes, wake sessions and the coordinator
//! - `server` - Unix socket server with a uid allow-list
//! - `monitor` - Periodic health logging
//! - `settings` - Environment and `.env` configuration
//! - `cli` - The `wold` command line
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        wold daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  DaemonServer   │────▶│     RegistryActor           │    │
//! │  │ (Unix Socket)   │     │  (name → {mac, ip} owner)   │    │
//! │  └────────┬────────┘     └─────────────────────────────┘    │
//! │           │ wake / wake_all / status                        │
//! │           ▼                                                 │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   Coordinator   │────▶│ WakeSession (one task each) │    │
//! │  └─────────────────┘     └──────────────┬──────────────┘    │
//! │                                         │ notifications     │
//! │                                         ▼                   │
//! │                          requester connection + watchers    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod cli;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod settings;
pub mod wake;
