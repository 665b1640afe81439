//! `wold` command line: start, stop and inspect the daemon.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! wold start
//!
//! # Start the daemon (background/daemonized)
//! wold start -d
//!
//! # Stop the daemon
//! wold stop
//!
//! # Check daemon status
//! wold status
//!
//! # Write missing default keys to ./.env
//! wold init-env
//!
//! # Enable debug logging
//! RUST_LOG=wold=debug wold start
//! ```
//!
//! # Signal Handling
//!
//! SIGTERM/SIGINT trigger a graceful shutdown: the server stops accepting,
//! unfinished wake sessions are aborted and the socket file is removed.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wol_core::ensure_env_defaults;

use crate::monitor::spawn_monitor_task;
use crate::registry::{spawn_registry, TargetStore};
use crate::server::DaemonServer;
use crate::settings::DaemonSettings;
use crate::wake::{Coordinator, PingProber, UdpPacketSender};

/// Default env file, relative to the working directory
pub const DEFAULT_ENV_FILE: &str = ".env";

/// wol daemon - wakes machines and reports when they come online
#[derive(Parser, Debug)]
#[command(name = "wold", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Env file with configuration values
        #[arg(long, default_value = DEFAULT_ENV_FILE)]
        env_file: PathBuf,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status {
        #[arg(long, default_value = DEFAULT_ENV_FILE)]
        env_file: PathBuf,
    },
    /// Add missing default configuration keys to an env file
    InitEnv {
        #[arg(default_value = DEFAULT_ENV_FILE)]
        path: PathBuf,
    },
}

/// Directory for the PID and log files.
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("wol")
}

pub fn pid_file_path() -> PathBuf {
    state_dir().join("wold.pid")
}

pub fn log_file_path() -> PathBuf {
    state_dir().join("wold.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Returns the PID of a running daemon, removing a stale PID file.
pub fn running_daemon_pid() -> Option<u32> {
    let pid = read_pid()?;
    if is_process_running(pid) {
        return Some(pid);
    }
    remove_pid_file();
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    let pid = i32::try_from(pid).context("PID out of range")?;
    // SAFETY: kill has no memory-safety preconditions
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

/// Makes a relative path absolute so it survives the chdir of daemonizing.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    Ok(cwd.join(path))
}

/// Entry point of the `wold` binary.
pub fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        env_file: PathBuf::from(DEFAULT_ENV_FILE),
    });

    match command {
        Command::Start { daemon, env_file } => {
            if let Some(pid) = running_daemon_pid() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'wold stop' to stop it first.");
                process::exit(1);
            }

            let env_file = absolute(&env_file)?;
            let mut settings = DaemonSettings::load(&env_file)
                .with_context(|| format!("Invalid configuration ({})", env_file.display()))?;
            settings.socket_path = absolute(&settings.socket_path)?;
            settings.computers_file = absolute(&settings.computers_file)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;
            let result = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start tokio runtime")
                .and_then(|runtime| runtime.block_on(run_daemon(settings)));
            remove_pid_file();
            result
        }
        Command::Stop => {
            let Some(pid) = running_daemon_pid() else {
                println!("Daemon is not running.");
                return Ok(());
            };

            println!("Stopping daemon (PID {pid})...");
            stop_daemon(pid)?;

            for _ in 0..50 {
                if !is_process_running(pid) {
                    println!("Daemon stopped.");
                    return Ok(());
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            eprintln!("Daemon did not stop within 5 seconds.");
            process::exit(1);
        }
        Command::Status { env_file } => {
            let Some(pid) = running_daemon_pid() else {
                println!("Daemon is not running.");
                process::exit(1);
            };

            println!("Daemon is running (PID {pid})");
            if let Ok(settings) = DaemonSettings::load(&env_file) {
                if settings.socket_path.exists() {
                    println!("Socket: {}", settings.socket_path.display());
                }
                println!("Registry: {}", settings.computers_file.display());
            }
            println!("Log: {}", log_file_path().display());
            Ok(())
        }
        Command::InitEnv { path } => {
            let added = ensure_env_defaults(&path)
                .with_context(|| format!("Failed to update {}", path.display()))?;
            if added.is_empty() {
                println!("{} already has every key.", path.display());
            } else {
                println!("Added to {}: {}", path.display(), added.join(", "));
            }
            Ok(())
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Installs the global tracing subscriber.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("wold=info".parse()?)
                .add_directive("wol_core=info".parse()?),
        )
        .init();
    Ok(())
}

async fn run_daemon(settings: DaemonSettings) -> Result<()> {
    init_tracing()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "wol daemon starting"
    );
    info!(
        max_tries = settings.wake.max_tries,
        check_interval_secs = settings.wake.check_interval.as_secs_f64(),
        resend_every = settings.wake.resend_every,
        probe_timeout_secs = settings.wake.probe_timeout.as_secs_f64(),
        destination = %format!("{}:{}", settings.wake.broadcast, settings.wake.port),
        "Wake policy"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(TargetStore::new(&settings.computers_file))
        .await
        .context("Failed to load target registry")?;
    info!(path = %settings.computers_file.display(), "Target registry started");

    let sender = UdpPacketSender::from_config(&settings.wake);
    let coordinator = Coordinator::new(
        Arc::new(settings.wake),
        Arc::new(sender),
        Arc::new(PingProber::new()),
    );

    let _monitor_handle = spawn_monitor_task(coordinator.clone(), cancel_token.clone());

    let server = DaemonServer::new(
        &settings.socket_path,
        registry,
        coordinator,
        settings.access,
        cancel_token,
    );

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("wol daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_start_daemonized() {
        let args = Args::parse_from(["wold", "start", "-d", "--env-file", "/etc/wol.env"]);
        match args.command {
            Some(Command::Start { daemon, env_file }) => {
                assert!(daemon);
                assert_eq!(env_file, PathBuf::from("/etc/wol.env"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_init_env_default_path() {
        let args = Args::parse_from(["wold", "init-env"]);
        assert!(matches!(
            args.command,
            Some(Command::InitEnv { path }) if path == PathBuf::from(DEFAULT_ENV_FILE)
        ));
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        let path = Path::new("/var/lib/wol/computers.json");
        assert_eq!(absolute(path).unwrap(), path);
        assert!(absolute(Path::new("computers.json")).unwrap().is_absolute());
    }

    #[test]
    fn test_state_paths() {
        assert!(pid_file_path().ends_with("wol/wold.pid"));
        assert!(log_file_path().ends_with("wol/wold.log"));
    }
}
