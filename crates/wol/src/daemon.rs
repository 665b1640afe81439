//! Daemon management for the wol client.
//!
//! Checks whether `wold` is running and starts it in the background when
//! it is not, so `wol wake nas` works on a fresh login.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{CliError, Result};

/// Returns the path to the daemon PID file.
fn pid_file_path() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("wol")
        .join("wold.pid")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Checks if the daemon is currently running.
pub fn is_daemon_running() -> bool {
    read_pid().is_some_and(is_process_running)
}

/// Spawns `wold start -d` as a detached process.
///
/// The `wold` binary next to the current executable is preferred over the
/// one on `PATH`.
fn spawn_daemon(env_file: &Path) -> std::io::Result<()> {
    let wold_path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("wold")))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from("wold"));

    debug!(path = %wold_path.display(), env_file = %env_file.display(), "Starting daemon");

    Command::new(&wold_path)
        .args(["start", "-d", "--env-file"])
        .arg(env_file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(())
}

/// Ensures the daemon is running and listening, starting it if necessary.
///
/// Waits up to 3 seconds for the PID file and the socket to appear.
pub fn ensure_daemon_running(socket_path: &Path, env_file: &Path) -> Result<()> {
    if is_daemon_running() && socket_path.exists() {
        debug!("Daemon already running");
        return Ok(());
    }

    if !is_daemon_running() {
        info!("Daemon not running, starting it...");
        spawn_daemon(env_file).map_err(|e| CliError::DaemonStart(e.to_string()))?;
    }

    for i in 0..30 {
        thread::sleep(Duration::from_millis(100));

        if is_daemon_running() && socket_path.exists() {
            info!(attempts = i + 1, "Daemon started successfully");
            return Ok(());
        }
    }

    Err(CliError::DaemonStart(format!(
        "daemon did not start listening on {} within 3 seconds (see {})",
        socket_path.display(),
        pid_file_path().with_file_name("wold.log").display()
    )))
}
