//! Daemon connection client for the wol command line.
//!
//! This module provides the `DaemonClient` which handles:
//! - Connection and handshake with the daemon over its Unix socket
//! - Request/response exchanges (add, remove, list, status)
//! - Following wake sessions until each reports its terminal event
//!
//! Wake notifications arrive asynchronously after `wake_started`. The client
//! buffers any notification that shows up before it, and sends a ping while
//! it waits so long polling budgets never hit the daemon's idle timeout.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info};

use wol_core::{Notification, SessionId, Target, TargetStatus};
use wol_protocol::{ClientMessage, DaemonMessage, ProtocolVersion, StartedSession};

use crate::error::{CliError, Result};

/// Socket the daemon listens on unless `WOL_SOCKET` says otherwise.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/wol.sock";

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for [`DaemonClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the Unix socket where the daemon listens.
    pub socket_path: PathBuf,

    /// Upper bound for a request's response.
    pub response_timeout: Duration,

    /// Quiet period after which a ping is sent while following sessions.
    pub keepalive: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            response_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Wake Report
// ============================================================================

/// Result of following a `wake` or `wake_all` request to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WakeReport {
    /// Sessions the daemon started, in the order it reported them
    pub started: Vec<StartedSession>,
    /// Terminal notification of every started session, in arrival order
    pub outcomes: Vec<Notification>,
}

impl WakeReport {
    /// True if the request found nothing to wake.
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }

    /// Number of sessions whose target ended up reachable.
    pub fn online_count(&self) -> usize {
        self.outcomes.iter().filter(|n| n.event.is_success()).count()
    }

    /// True if every started session ended with its target reachable.
    pub fn all_online(&self) -> bool {
        self.online_count() == self.started.len()
    }
}

// ============================================================================
// Daemon Client
// ============================================================================

/// A handshaken connection to the wol daemon.
///
/// # Example
///
/// ```rust,ignore
/// use wol_cli::client::{ClientConfig, DaemonClient};
///
/// let mut client = DaemonClient::connect(ClientConfig::default()).await?;
/// for target in client.list_targets().await? {
///     println!("{}", target.name);
/// }
/// client.disconnect().await;
/// ```
pub struct DaemonClient {
    config: ClientConfig,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    client_id: String,
    next_seq: u64,
}

impl DaemonClient {
    /// Connects to the daemon socket and performs the handshake.
    ///
    /// # Errors
    ///
    /// - `DaemonConnection` if the socket cannot be reached
    /// - `Rejected` if the daemon refuses this user or protocol version
    /// - `VersionMismatch` if the daemon speaks an incompatible protocol
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        debug!(socket_path = %config.socket_path.display(), "Connecting to daemon");

        let stream = UnixStream::connect(&config.socket_path)
            .await
            .map_err(|e| {
                CliError::DaemonConnection(format!("{}: {e}", config.socket_path.display()))
            })?;
        let (reader, writer) = stream.into_split();

        let mut client = Self {
            config,
            lines: BufReader::new(reader).lines(),
            writer,
            client_id: String::new(),
            next_seq: 0,
        };
        client.handshake().await?;
        Ok(client)
    }

    /// Identifier the daemon assigned to this connection.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn handshake(&mut self) -> Result<()> {
        let requested = format!("wol-{}", std::process::id());
        self.send(&ClientMessage::connect(Some(requested))).await?;

        match self.recv().await? {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                ProtocolVersion::CURRENT
                    .check_compatible(&protocol_version)
                    .map_err(|_| CliError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    })?;
                self.client_id = client_id;
                info!(
                    client_id = %self.client_id,
                    protocol_version = %protocol_version,
                    "Handshake complete"
                );
                Ok(())
            }
            DaemonMessage::Rejected { reason, .. } => Err(CliError::Rejected(reason)),
            other => Err(unexpected("connect", &other)),
        }
    }

    // ------------------------------------------------------------------------
    // Registry requests
    // ------------------------------------------------------------------------

    /// Registers a target, returning true if it replaced one with the same name.
    pub async fn add_target(&mut self, name: &str, mac: &str, ip: &str) -> Result<bool> {
        match self.request(ClientMessage::add_target(name, mac, ip)).await? {
            DaemonMessage::TargetAdded { replaced, .. } => Ok(replaced),
            other => Err(unexpected("add_target", &other)),
        }
    }

    pub async fn remove_target(&mut self, name: &str) -> Result<()> {
        match self.request(ClientMessage::remove_target(name)).await? {
            DaemonMessage::TargetRemoved { .. } => Ok(()),
            other => Err(unexpected("remove_target", &other)),
        }
    }

    /// All registered targets, sorted by name.
    pub async fn list_targets(&mut self) -> Result<Vec<Target>> {
        match self.request(ClientMessage::list_targets()).await? {
            DaemonMessage::TargetList { targets } => Ok(targets),
            other => Err(unexpected("list_targets", &other)),
        }
    }

    /// One-shot reachability of every registered target.
    pub async fn status(&mut self) -> Result<Vec<TargetStatus>> {
        match self.request(ClientMessage::status()).await? {
            DaemonMessage::StatusReport { statuses } => Ok(statuses),
            other => Err(unexpected("status", &other)),
        }
    }

    /// Round-trips a ping.
    pub async fn ping(&mut self) -> Result<()> {
        let seq = self.next_seq();
        self.send(&ClientMessage::ping(seq)).await?;
        loop {
            match self.recv().await? {
                DaemonMessage::Pong { seq: echoed } if echoed == seq => return Ok(()),
                DaemonMessage::Error { message, code } => {
                    return Err(CliError::Daemon { message, code })
                }
                _ => continue,
            }
        }
    }

    // ------------------------------------------------------------------------
    // Wake requests
    // ------------------------------------------------------------------------

    /// Wakes one target and follows its session to the end.
    ///
    /// `on_event` sees every notification of the session in order.
    pub async fn wake<F>(&mut self, name: &str, on_event: F) -> Result<WakeReport>
    where
        F: FnMut(&Notification),
    {
        self.follow_wake(ClientMessage::wake(name), on_event).await
    }

    /// Wakes every registered target and follows all sessions to the end.
    ///
    /// Returns an empty report if nothing is registered.
    pub async fn wake_all<F>(&mut self, on_event: F) -> Result<WakeReport>
    where
        F: FnMut(&Notification),
    {
        self.follow_wake(ClientMessage::wake_all(), on_event).await
    }

    async fn follow_wake<F>(&mut self, request: ClientMessage, mut on_event: F) -> Result<WakeReport>
    where
        F: FnMut(&Notification),
    {
        self.send(&request).await?;

        // Notifications may overtake wake_started; hold them until we know
        // which sessions are ours
        let mut early = Vec::new();
        let started = loop {
            match self.recv_following().await? {
                DaemonMessage::WakeStarted { sessions } => break sessions,
                DaemonMessage::NothingToWake => return Ok(WakeReport::default()),
                DaemonMessage::Notification { notification } => early.push(notification),
                DaemonMessage::Error { message, code } => {
                    return Err(CliError::Daemon { message, code })
                }
                DaemonMessage::Pong { .. } => {}
                other => return Err(unexpected("wake", &other)),
            }
        };

        let mut pending: HashSet<SessionId> = started.iter().map(|s| s.session_id).collect();
        let mut report = WakeReport {
            started,
            outcomes: Vec::new(),
        };

        for notification in early {
            track(notification, &mut pending, &mut report, &mut on_event);
        }

        while !pending.is_empty() {
            match self.recv_following().await? {
                DaemonMessage::Notification { notification } => {
                    track(notification, &mut pending, &mut report, &mut on_event);
                }
                DaemonMessage::Pong { .. } => {}
                DaemonMessage::Error { message, code } => {
                    return Err(CliError::Daemon { message, code })
                }
                other => return Err(unexpected("wake", &other)),
            }
        }

        Ok(report)
    }

    /// Subscribes to every session's notifications and passes them to
    /// `on_event` until the daemon closes the connection.
    pub async fn watch<F>(&mut self, mut on_event: F) -> Result<()>
    where
        F: FnMut(&Notification),
    {
        self.send(&ClientMessage::watch()).await?;
        // Watch has no acknowledgement; a refusal arrives before the pong
        self.ping().await?;

        loop {
            match self.recv_following().await? {
                DaemonMessage::Notification { notification } => on_event(&notification),
                DaemonMessage::Error { message, code } => {
                    return Err(CliError::Daemon { message, code })
                }
                _ => {}
            }
        }
    }

    /// Tells the daemon we are leaving. Errors are irrelevant at this point.
    pub async fn disconnect(mut self) {
        let _ = self.send(&ClientMessage::disconnect()).await;
        let _ = self.writer.shutdown().await;
    }

    // ------------------------------------------------------------------------
    // Wire helpers
    // ------------------------------------------------------------------------

    async fn request(&mut self, message: ClientMessage) -> Result<DaemonMessage> {
        self.send(&message).await?;
        loop {
            match self.recv().await? {
                DaemonMessage::Error { message, code } => {
                    return Err(CliError::Daemon { message, code })
                }
                DaemonMessage::Notification { .. } | DaemonMessage::Pong { .. } => continue,
                other => return Ok(other),
            }
        }
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        debug!(message_type = ?message.message, "Sent message to daemon");
        Ok(())
    }

    /// Reads the next message, failing after `response_timeout`.
    async fn recv(&mut self) -> Result<DaemonMessage> {
        loop {
            let line = timeout(self.config.response_timeout, self.lines.next_line())
                .await
                .map_err(|_| CliError::Timeout)??;
            if let Some(message) = decode(line)? {
                return Ok(message);
            }
        }
    }

    /// Reads the next message without a deadline, pinging on quiet periods.
    async fn recv_following(&mut self) -> Result<DaemonMessage> {
        loop {
            // next_line is cancel safe, so timing out never drops a partial line
            match timeout(self.config.keepalive, self.lines.next_line()).await {
                Ok(line) => {
                    if let Some(message) = decode(line?)? {
                        return Ok(message);
                    }
                }
                Err(_) => {
                    let seq = self.next_seq();
                    debug!(seq, "Sending keepalive ping");
                    self.send(&ClientMessage::ping(seq)).await?;
                }
            }
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq = self.next_seq.wrapping_add(1);
        self.next_seq
    }
}

/// Parses one line; blank lines yield `None`.
fn decode(line: Option<String>) -> Result<Option<DaemonMessage>> {
    let Some(line) = line else {
        return Err(CliError::ConnectionClosed);
    };
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

fn track<F>(
    notification: Notification,
    pending: &mut HashSet<SessionId>,
    report: &mut WakeReport,
    on_event: &mut F,
) where
    F: FnMut(&Notification),
{
    let ours = report
        .started
        .iter()
        .any(|s| s.session_id == notification.session_id);
    if !ours {
        return;
    }

    on_event(&notification);
    if notification.event.is_terminal() && pending.remove(&notification.session_id) {
        report.outcomes.push(notification);
    }
}

fn unexpected(request: &str, response: &DaemonMessage) -> CliError {
    CliError::ProtocolError(format!("Unexpected response to {request}: {response:?}"))
}
