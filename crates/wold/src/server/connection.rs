//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Checks the protocol version and the peer uid against the allow-list
//! - Routes registry commands to the registry actor
//! - Starts wake sessions and forwards their notifications back
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use wol_core::{Notification, Target};
use wol_protocol::{
    error_code, ClientMessage, DaemonMessage, MessageType, ProtocolVersion, StartedSession,
    VersionError,
};

use super::access::AccessPolicy;
use crate::registry::{RegistryError, RegistryHandle};
use crate::wake::{Coordinator, Notifier, WakeMany};

/// Shared, lockable write half of a client connection
pub type ClientWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Connections that asked to watch every session, keyed by connection number.
///
/// Client ids are chosen by the client and may repeat across connections.
pub type WatchersMap = Arc<RwLock<HashMap<u64, ClientWriter>>>;

/// Maximum number of concurrent watchers
pub const MAX_WATCHERS: usize = 10;

/// Maximum message size (1 MB). Reads stop one byte past it.
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection needs from the daemon.
#[derive(Clone)]
pub struct ConnectionContext {
    pub registry: RegistryHandle,
    pub coordinator: Coordinator,
    pub access: Arc<AccessPolicy>,
    pub watchers: WatchersMap,
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: ClientWriter,
    ctx: ConnectionContext,

    /// Uid from the socket peer credentials, if the OS provided one
    peer_uid: Option<u32>,

    /// Unique client identifier (assigned after handshake)
    client_id: Option<String>,

    /// Handed to sessions started by this connection. Own sessions always
    /// arrive here, watching or not; the broadcaster skips them.
    notifier: mpsc::UnboundedSender<Notification>,
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,

    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        ctx: ConnectionContext,
        peer_uid: Option<u32>,
        connection_number: u64,
    ) -> Self {
        let (notifier, notifications) = mpsc::unbounded_channel();
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            ctx,
            peer_uid,
            client_id: None,
            notifier,
            notifications: Some(notifications),
            connection_number,
        }
    }

    /// Runs the connection handler until the connection closes.
    ///
    /// Returns the client_id if the handshake succeeded.
    pub async fn run(mut self) -> Option<String> {
        debug!(
            connection = self.connection_number,
            peer_uid = ?self.peer_uid,
            "New client connected"
        );

        match self.handle_handshake().await {
            Ok(()) => {
                info!(client_id = ?self.client_id, peer_uid = ?self.peer_uid, "Client handshake completed");
            }
            Err(e) => {
                warn!(
                    connection = self.connection_number,
                    error = %e,
                    "Handshake failed"
                );
                return None;
            }
        }

        self.spawn_notification_forwarder();
        let client_id = self.client_id.clone();

        if let Err(e) = self.process_messages().await {
            debug!(
                client_id = ?self.client_id,
                error = %e,
                "Connection closed"
            );
        }

        info!(client_id = ?self.client_id, "Client disconnected");
        client_id
    }

    /// Expects a `Connect` message, then checks version and allow-list.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = self.read_message().await?;

        let client_version = msg.protocol_version;
        if let Err(e) = ProtocolVersion::CURRENT.check_compatible(&client_version) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );
            self.send_message(DaemonMessage::rejected(&e.to_string()))
                .await?;
            return Err(ConnectionError::Version(e));
        }

        let MessageType::Connect { client_id } = msg.message else {
            self.send_message(DaemonMessage::error(
                "Expected Connect message for handshake",
            ))
            .await?;
            return Err(ConnectionError::UnexpectedMessage(format!(
                "{:?}",
                msg.message
            )));
        };

        if !self.ctx.access.is_allowed(self.peer_uid) {
            warn!(peer_uid = ?self.peer_uid, "Connection from user not on the allow-list");
            self.send_message(DaemonMessage::rejected("user is not allowed to use this daemon"))
                .await?;
            return Err(ConnectionError::NotAllowed { uid: self.peer_uid });
        }

        let assigned_id =
            client_id.unwrap_or_else(|| format!("client-{}", self.connection_number));
        self.client_id = Some(assigned_id.clone());
        self.send_message(DaemonMessage::connected(assigned_id))
            .await
    }

    /// Writes notifications of this connection's sessions to the client.
    ///
    /// Ends when every sender is gone (the handler and all of its sessions)
    /// or the client stops accepting writes.
    fn spawn_notification_forwarder(&mut self) {
        let Some(mut notifications) = self.notifications.take() else {
            return;
        };
        let writer = Arc::clone(&self.writer);
        let client_id = self.client_id.clone();

        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                let msg = DaemonMessage::notification(notification);
                let mut writer = writer.lock().await;
                if let Err(e) = write_message(&mut writer, &msg).await {
                    debug!(client_id = ?client_id, error = %e, "Stopped forwarding notifications");
                    break;
                }
            }
        });
    }

    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(ConnectionError::ParseError(e))) => {
                    debug!(client_id = ?self.client_id, error = %e, "Malformed message");
                    self.send_message(DaemonMessage::error(&format!("Malformed message: {e}")))
                        .await?;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            match self.handle_message(msg).await {
                Ok(()) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => {
                    error!(
                        client_id = ?self.client_id,
                        error = %e,
                        "Error handling message"
                    );
                    // Send error response but continue processing
                    let _ = self
                        .send_message(DaemonMessage::error(&e.to_string()))
                        .await;
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        match msg.message {
            MessageType::Connect { .. } => {
                self.send_message(DaemonMessage::error("Already connected"))
                    .await?;
            }

            MessageType::AddTarget { name, mac, ip } => {
                self.handle_add_target(&name, &mac, &ip).await?;
            }

            MessageType::RemoveTarget { name } => match self.ctx.registry.remove(&name).await {
                Ok(removed) => {
                    self.send_message(DaemonMessage::target_removed(removed.name))
                        .await?;
                }
                Err(e) => self.send_registry_error(e).await?,
            },

            MessageType::ListTargets => {
                let targets = self.ctx.registry.list().await;
                self.send_message(DaemonMessage::target_list(targets))
                    .await?;
            }

            MessageType::Wake { name } => match self.ctx.registry.get(&name).await {
                Some(target) => self.handle_wake(vec![target]).await?,
                None => {
                    self.send_registry_error(RegistryError::NotFound(name))
                        .await?;
                }
            },

            MessageType::WakeAll => {
                let targets: Vec<Target> = self
                    .ctx
                    .registry
                    .snapshot()
                    .await
                    .into_iter()
                    .map(|(name, record)| Target::from_record(name, record))
                    .collect();
                self.handle_wake(targets).await?;
            }

            MessageType::Status => {
                let targets = self.ctx.registry.list().await;
                let statuses = self.ctx.coordinator.status_all(targets).await;
                self.send_message(DaemonMessage::status_report(statuses))
                    .await?;
            }

            MessageType::Watch => {
                self.handle_watch().await?;
            }

            MessageType::Ping { seq } => {
                self.send_message(DaemonMessage::pong(seq)).await?;
            }

            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        }

        Ok(())
    }

    async fn handle_add_target(
        &self,
        name: &str,
        mac: &str,
        ip: &str,
    ) -> Result<(), ConnectionError> {
        let target = match Target::parse(name, mac, ip) {
            Ok(target) => target,
            Err(e) => {
                debug!(client_id = ?self.client_id, error = %e, "Rejected target");
                return self
                    .send_message(DaemonMessage::error_with_code(
                        &e.to_string(),
                        error_code::INVALID_TARGET,
                    ))
                    .await;
            }
        };

        let name = target.name.clone();
        match self.ctx.registry.upsert(target).await {
            Ok(upserted) => {
                self.send_message(DaemonMessage::target_added(name, upserted.replaced))
                    .await
            }
            Err(e) => self.send_registry_error(e).await,
        }
    }

    /// Starts one session per target and reports them with `WakeStarted`.
    ///
    /// The writer lock is held from before the first spawn until
    /// `WakeStarted` is written, so it always precedes the notifications.
    async fn handle_wake(&self, targets: Vec<Target>) -> Result<(), ConnectionError> {
        let requester: Arc<dyn Notifier> = Arc::new(ConnectionNotifier {
            connection: self.connection_number,
            sender: self.notifier.clone(),
        });
        let mut writer = self.writer.lock().await;

        let msg = match self.ctx.coordinator.wake_many(targets, requester) {
            WakeMany::Started(started) => DaemonMessage::wake_started(
                started
                    .into_iter()
                    .map(|(session_id, name)| StartedSession { session_id, name })
                    .collect(),
            ),
            WakeMany::NothingToWake => DaemonMessage::NothingToWake,
        };

        write_message(&mut writer, &msg).await
    }

    async fn handle_watch(&self) -> Result<(), ConnectionError> {
        let Some(client_id) = self.client_id.clone() else {
            return self
                .send_message(DaemonMessage::error("Must connect before watching"))
                .await;
        };

        {
            let mut watchers = self.ctx.watchers.write().await;
            if watchers.len() >= MAX_WATCHERS && !watchers.contains_key(&self.connection_number)
            {
                drop(watchers);
                return self
                    .send_message(DaemonMessage::error(&format!(
                        "Too many watchers (max: {MAX_WATCHERS})"
                    )))
                    .await;
            }
            watchers.insert(self.connection_number, Arc::clone(&self.writer));
        }

        debug!(
            client_id = %client_id,
            connection = self.connection_number,
            "Client is watching all sessions"
        );
        Ok(())
    }

    /// Answers with a coded error; unknown names and save failures are
    /// reported to the client, not treated as connection errors.
    async fn send_registry_error(&self, e: RegistryError) -> Result<(), ConnectionError> {
        let code = match &e {
            RegistryError::NotFound(_) => error_code::UNKNOWN_TARGET,
            RegistryError::Store(_) => error_code::REGISTRY,
            RegistryError::ChannelClosed => {
                return Err(ConnectionError::Registry(e.to_string()));
            }
        };
        self.send_message(DaemonMessage::error_with_code(&e.to_string(), code))
            .await
    }

    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();

        let bytes_read = read_line_bounded(&mut self.reader, &mut line, MAX_MESSAGE_SIZE).await?;
        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        let msg: ClientMessage = serde_json::from_str(&line)
            .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = ?std::mem::discriminant(&msg.message),
            "Received message"
        );

        Ok(msg)
    }

    async fn send_message(&self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        write_message(&mut writer, &msg).await
    }
}

/// Requester handle for sessions started by one connection.
struct ConnectionNotifier {
    connection: u64,
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier for ConnectionNotifier {
    fn notify(&self, notification: Notification) {
        self.sender.notify(notification);
    }

    fn origin(&self) -> Option<u64> {
        Some(self.connection)
    }
}

/// Reads one line, buffering at most `max + 1` bytes.
///
/// A line longer than `max` fails with `MessageTooLarge` without reading
/// the rest of it.
async fn read_line_bounded<R>(
    reader: &mut R,
    line: &mut String,
    max: usize,
) -> Result<usize, ConnectionError>
where
    R: AsyncBufRead + Unpin,
{
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let bytes_read = reader
        .take(limit)
        .read_line(line)
        .await
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

    if line.len() > max {
        return Err(ConnectionError::MessageTooLarge {
            size: line.len(),
            max,
        });
    }

    Ok(bytes_read)
}

/// Writes one newline-terminated JSON message with a timeout.
pub(crate) async fn write_message(
    writer: &mut BufWriter<OwnedWriteHalf>,
    msg: &DaemonMessage,
) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: {0}")]
    Version(#[from] VersionError),

    #[error("Peer uid {uid:?} is not on the allow-list")]
    NotAllowed { uid: Option<u32> },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Registry error: {0}")]
    Registry(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::from(
            ProtocolVersion::CURRENT
                .check_compatible(&ProtocolVersion::new(2, 0))
                .unwrap_err(),
        );
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));

        let err = ConnectionError::NotAllowed { uid: Some(1234) };
        assert!(err.to_string().contains("1234"));
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }

    #[tokio::test]
    async fn test_read_line_bounded_stops_past_limit() {
        let data = vec![b'x'; 4096];
        let mut reader: &[u8] = &data;
        let mut line = String::new();

        let err = read_line_bounded(&mut reader, &mut line, 100)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::MessageTooLarge { max: 100, .. }));
        // Only one byte past the limit is consumed
        assert_eq!(line.len(), 101);
        assert_eq!(reader.len(), 4096 - 101);
    }

    #[tokio::test]
    async fn test_read_line_bounded_accepts_line_at_limit() {
        let mut reader: &[u8] = b"{\"a\":1}\nnext\n";
        let mut line = String::new();

        let n = read_line_bounded(&mut reader, &mut line, 8).await.unwrap();

        assert_eq!(n, 8);
        assert_eq!(line, "{\"a\":1}\n");
        assert_eq!(reader, b"next\n");
    }

    #[tokio::test]
    async fn test_read_line_bounded_eof() {
        let mut reader: &[u8] = b"";
        let mut line = String::new();
        assert_eq!(read_line_bounded(&mut reader, &mut line, 8).await.unwrap(), 0);
    }
}
