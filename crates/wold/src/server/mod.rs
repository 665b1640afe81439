//! Unix socket server for the wol daemon.
//!
//! The server:
//! - Listens on a Unix socket for client connections
//! - Spawns a ConnectionHandler for each client, passing its peer uid
//! - Fans every session notification out to watching clients
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     └─────────────────┘
//! │                 │     ┌─────────────────┐
//! │                 │────▶│   Coordinator   │──▶ WakeSession tasks
//! └─────────────────┘     └────────┬────────┘
//!         ▲ own sessions (mpsc)    │ other sessions (broadcast)
//!         └──────── notifications ─┴──▶ watchers
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod access;
mod connection;

pub use access::{AccessError, AccessPolicy};
pub use connection::{
    ClientWriter, ConnectionContext, ConnectionError, ConnectionHandler, WatchersMap,
    MAX_WATCHERS,
};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wol_protocol::DaemonMessage;

use crate::registry::RegistryHandle;
use crate::wake::{Coordinator, WatchedNotification};
use connection::write_message;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/wol.sock";

/// Unix socket server for the wol daemon.
pub struct DaemonServer {
    socket_path: PathBuf,
    ctx: ConnectionContext,
    cancel_token: CancellationToken,

    /// Numbers connections; also keys the watchers map
    connection_counter: AtomicU64,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        registry: RegistryHandle,
        coordinator: Coordinator,
        access: AccessPolicy,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            ctx: ConnectionContext {
                registry,
                coordinator,
                access: Arc::new(access),
                watchers: Arc::new(RwLock::new(HashMap::new())),
            },
            cancel_token,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Removes a stale socket file, creates the parent directory and binds.
    fn bind_socket(&self) -> Result<UnixListener, ServerError> {
        let setup_error = |e: std::io::Error| ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        };

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(setup_error)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(setup_error)?;
            }
        }

        UnixListener::bind(&self.socket_path).map_err(setup_error)
    }

    /// Runs the server until the cancellation token is triggered.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind_socket()?;
        info!(
            socket = %self.socket_path.display(),
            "Daemon server listening"
        );

        self.spawn_watch_broadcaster();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    fn handle_connection(&self, stream: UnixStream, connection_number: u64) {
        let peer_uid = match stream.peer_cred() {
            Ok(cred) => Some(cred.uid()),
            Err(e) => {
                warn!(error = %e, "Could not read peer credentials");
                None
            }
        };

        let (reader, writer) = stream.into_split();
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            let watchers = Arc::clone(&ctx.watchers);
            let handler = ConnectionHandler::new(reader, writer, ctx, peer_uid, connection_number);

            let client_id = handler.run().await;

            if watchers.write().await.remove(&connection_number).is_some() {
                debug!(
                    client_id = ?client_id,
                    connection = connection_number,
                    "Removed disconnected watcher"
                );
            }
        });
    }

    /// Forwards every session notification to watching clients.
    fn spawn_watch_broadcaster(&self) {
        let mut notifications = self.ctx.coordinator.subscribe();
        let watchers = Arc::clone(&self.ctx.watchers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Watch broadcaster shutting down");
                        break;
                    }

                    result = notifications.recv() => {
                        match result {
                            Ok(watched) => {
                                broadcast_notification(&watchers, watched).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Watch broadcaster lagged, skipped notifications");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Notification channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    async fn cleanup(&self) {
        self.ctx.watchers.write().await.clear();

        let aborted = self.ctx.coordinator.abort_all();
        if aborted > 0 {
            info!(aborted, "Stopped unfinished wake sessions");
        }

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Sends a notification to all watchers, dropping those that fail.
///
/// The connection that started the session is skipped; it already got the
/// notification on its own channel.
async fn broadcast_notification(watchers: &WatchersMap, watched: WatchedNotification) {
    let origin = watched.origin;
    let msg = DaemonMessage::notification(watched.notification);

    let subs = watchers.read().await;
    let mut failed = Vec::new();

    for (&connection, writer) in subs.iter() {
        if Some(connection) == origin {
            continue;
        }
        let mut writer = writer.lock().await;
        if let Err(e) = write_message(&mut writer, &msg).await {
            debug!(
                connection,
                error = %e,
                "Failed to send notification to watcher"
            );
            failed.push(connection);
        }
    }

    // Remove failed watchers (need to drop read lock first)
    drop(subs);

    if !failed.is_empty() {
        let mut subs = watchers.write().await;
        for connection in failed {
            subs.remove(&connection);
            debug!(connection, "Removed failed watcher");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },
}
