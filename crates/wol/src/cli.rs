//! `wol` command line: manage targets and wake them through the daemon.
//!
//! # Usage
//!
//! ```bash
//! wol add nas 00:11:22:33:44:55 192.168.1.10
//! wol list
//! wol wake nas          # streams progress until nas is online or gives up
//! wol wake-all
//! wol status            # one-shot reachability check
//! wol watch             # follow every session the daemon runs
//! wol remove nas
//! ```
//!
//! The daemon is started in the background when it is not running, unless
//! `--no-start` is given. `wake` and `wake-all` exit with status 1 if any
//! target did not come online.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wol_core::{read_env_file, Notification, Target, TargetStatus};

use crate::client::{ClientConfig, DaemonClient, WakeReport, DEFAULT_SOCKET_PATH};
use crate::daemon::ensure_daemon_running;

/// Default env file, relative to the working directory
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Environment key for the daemon socket path.
const SOCKET_KEY: &str = "WOL_SOCKET";

/// wol - wake machines on the LAN and see when they come online
#[derive(Parser, Debug)]
#[command(name = "wol", version, about)]
struct Args {
    /// Daemon socket path (overrides WOL_SOCKET)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Env file with configuration values
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Do not start the daemon if it is not running
    #[arg(long, global = true)]
    no_start: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a target, replacing one with the same name
    Add {
        name: String,
        /// MAC address, colon or dash separated
        mac: String,
        /// IPv4 address
        ip: String,
    },
    /// Remove a target
    Remove { name: String },
    /// List registered targets
    List,
    /// Wake a target and wait until it is online
    Wake { name: String },
    /// Wake every registered target
    WakeAll,
    /// Check which targets are online right now
    Status,
    /// Follow every wake session the daemon runs
    Watch,
}

/// Entry point of the `wol` binary.
pub fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let env_file = absolute(&args.env_file)?;
    let file_values = read_env_file(&env_file)
        .with_context(|| format!("Failed to read {}", env_file.display()))?;
    let socket_path = absolute(&resolve_socket_path(args.socket, |key| {
        std::env::var(key)
            .ok()
            .or_else(|| file_values.get(key).cloned())
    }))?;

    if !args.no_start {
        ensure_daemon_running(&socket_path, &env_file)?;
    }

    let config = ClientConfig {
        socket_path,
        ..ClientConfig::default()
    };

    let success = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?
        .block_on(run(args.command, config))?;

    if !success {
        process::exit(1);
    }
    Ok(())
}

/// Installs the global tracing subscriber. Quiet unless `RUST_LOG` asks.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("wol_cli=warn".parse()?))
        .init();
    Ok(())
}

/// Runs one command. Returns false if a wake left a target offline.
async fn run(command: Command, config: ClientConfig) -> Result<bool> {
    let socket_path = config.socket_path.clone();
    let mut client = DaemonClient::connect(config)
        .await
        .with_context(|| format!("Is the daemon running? (socket {})", socket_path.display()))?;

    let success = match command {
        Command::Add { name, mac, ip } => {
            let replaced = client.add_target(&name, &mac, &ip).await?;
            if replaced {
                println!("Updated '{name}'");
            } else {
                println!("Added '{name}'");
            }
            true
        }
        Command::Remove { name } => {
            client.remove_target(&name).await?;
            println!("Removed '{name}'");
            true
        }
        Command::List => {
            print!("{}", format_target_list(&client.list_targets().await?));
            true
        }
        Command::Wake { name } => {
            let report = client.wake(&name, print_notification).await?;
            finish_wake(&report)
        }
        Command::WakeAll => {
            let report = client.wake_all(print_notification).await?;
            finish_wake(&report)
        }
        Command::Status => {
            print!("{}", format_status(&client.status().await?));
            true
        }
        Command::Watch => {
            tokio::select! {
                result = client.watch(print_notification) => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
            true
        }
    };

    client.disconnect().await;
    Ok(success)
}

fn print_notification(notification: &Notification) {
    println!("{}", format_notification(notification));
}

fn finish_wake(report: &WakeReport) -> bool {
    if report.is_empty() {
        println!("No targets registered, nothing to wake.");
        return true;
    }
    if report.started.len() > 1 {
        println!(
            "{} of {} targets online",
            report.online_count(),
            report.started.len()
        );
    }
    report.all_online()
}

/// Picks the socket path: `--socket`, then `WOL_SOCKET`, then the default.
fn resolve_socket_path<F>(explicit: Option<PathBuf>, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .or_else(|| lookup(SOCKET_KEY).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    Ok(cwd.join(path))
}

// ============================================================================
// Output formatting
// ============================================================================

/// One line per notification, stamped with local time.
pub fn format_notification(notification: &Notification) -> String {
    format!(
        "[{}] {}",
        notification.at.with_timezone(&Local).format("%H:%M:%S"),
        notification.event
    )
}

/// Aligned `name  mac  ip` table.
pub fn format_target_list(targets: &[Target]) -> String {
    if targets.is_empty() {
        return "No targets registered.\n".to_string();
    }

    let width = targets.iter().map(|t| t.name.len()).max().unwrap_or(0);
    targets
        .iter()
        .map(|t| format!("{:<width$}  {}  {}\n", t.name, t.mac, t.ip))
        .collect()
}

/// Aligned `name  ip  online|offline` table.
pub fn format_status(statuses: &[TargetStatus]) -> String {
    if statuses.is_empty() {
        return "No targets registered.\n".to_string();
    }

    let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0);
    statuses
        .iter()
        .map(|s| {
            let state = if s.online { "online" } else { "offline" };
            format!("{:<width$}  {:<15}  {state}\n", s.name, s.ip.to_string())
        })
        .collect()
}
