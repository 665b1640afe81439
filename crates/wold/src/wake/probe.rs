//! Reachability probing via the system `ping` utility.
//!
//! Raw ICMP sockets need elevated privileges, so the probe shells out to
//! `ping -c 1` the same way the daemon shells out to other system tools.
//! Any failure to spawn, non-zero exit or timeout means "not reachable".

use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use super::Prober;

/// Program used when none is configured.
pub const DEFAULT_PING_PROGRAM: &str = "ping";

/// Prober that runs one ICMP echo through the system `ping`.
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
}

impl PingProber {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PING_PROGRAM)
    }

    /// Uses a different ping binary (e.g. an absolute path).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, ip: Ipv4Addr, timeout: Duration) -> Command {
        // ping's own deadline is whole seconds; the outer timeout enforces the rest
        let wait_secs = timeout.as_secs().max(1);

        let mut cmd = Command::new(&self.program);
        cmd.args(["-n", "-q", "-c", "1", "-W"])
            .arg(wait_secs.to_string())
            .arg(ip.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, ip: Ipv4Addr, timeout: Duration) -> bool {
        let mut cmd = self.command(ip, timeout);

        match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(Ok(status)) => {
                trace!(%ip, code = ?status.code(), "Ping finished");
                status.success()
            }
            Ok(Err(e)) => {
                debug!(%ip, program = %self.program, error = %e, "Failed to run ping");
                false
            }
            Err(_) => {
                trace!(%ip, timeout_ms = timeout.as_millis() as u64, "Ping timed out");
                false
            }
        }
    }
}
