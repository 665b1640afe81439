//! Session coordinator.
//!
//! Spawns one [`WakeSession`] per target as an independent tokio task and
//! returns immediately. Running sessions are tracked so the daemon can report
//! and abort them; a drop guard inside each task removes its entry however
//! the task ends.
//!
//! # Panic-Free Guarantees
//!
//! A poisoned tracking lock is recovered with `PoisonError::into_inner`;
//! the map only holds plain data, so no invariant can be half-updated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use wol_core::{Notification, SessionId, Target, TargetStatus, WakeConfig};

use super::session::WakeSession;
use super::{Notifier, PacketSender, Prober};

/// Buffer of the all-sessions notification channel.
const WATCH_BUFFER: usize = 256;

/// A session that has been spawned and has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightSession {
    pub id: SessionId,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

/// A notification on the all-sessions channel, tagged with the connection
/// whose request started the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedNotification {
    pub origin: Option<u64>,
    pub notification: Notification,
}

/// Result of [`Coordinator::wake_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeMany {
    /// One session per target, in input order
    Started(Vec<(SessionId, String)>),
    /// The target list was empty
    NothingToWake,
}

struct Tracked {
    session: InFlightSession,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    config: Arc<WakeConfig>,
    sender: Arc<dyn PacketSender>,
    prober: Arc<dyn Prober>,
    next_id: AtomicU64,
    watchers: broadcast::Sender<WatchedNotification>,
    in_flight: Mutex<HashMap<SessionId, Tracked>>,
}

impl Inner {
    fn tracked(&self) -> MutexGuard<'_, HashMap<SessionId, Tracked>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a session from the in-flight map when its task ends.
struct InFlightGuard {
    inner: Arc<Inner>,
    id: SessionId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.tracked().remove(&self.id);
    }
}

/// Delivers a session's notifications to its requester and to watchers.
///
/// The requester path is unbounded; the watcher channel is lossy when a
/// watcher lags, so a requester never relies on it for its own sessions.
struct SessionNotifier {
    requester: Arc<dyn Notifier>,
    watchers: broadcast::Sender<WatchedNotification>,
}

impl Notifier for SessionNotifier {
    fn notify(&self, notification: Notification) {
        // No subscribers is fine
        let _ = self.watchers.send(WatchedNotification {
            origin: self.requester.origin(),
            notification: notification.clone(),
        });
        self.requester.notify(notification);
    }

    fn origin(&self) -> Option<u64> {
        self.requester.origin()
    }
}

/// Starts wake sessions and keeps track of the ones still running.
///
/// Cheap to clone; all clones share the same sessions.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        config: Arc<WakeConfig>,
        sender: Arc<dyn PacketSender>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let (watchers, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            inner: Arc::new(Inner {
                config,
                sender,
                prober,
                next_id: AtomicU64::new(1),
                watchers,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &WakeConfig {
        &self.inner.config
    }

    /// Starts one session for `target` and returns without waiting for it.
    ///
    /// A second call for a target that is already being woken starts a
    /// second, independent session.
    pub fn wake_one(&self, target: Target, requester: Arc<dyn Notifier>) -> SessionId {
        let id = SessionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        self.inner.tracked().insert(
            id,
            Tracked {
                session: InFlightSession {
                    id,
                    name: target.name.clone(),
                    started_at: Utc::now(),
                },
                handle: None,
            },
        );

        let notifier = Arc::new(SessionNotifier {
            requester,
            watchers: self.inner.watchers.clone(),
        });
        let session = WakeSession::new(
            id,
            target,
            Arc::clone(&self.inner.config),
            Arc::clone(&self.inner.sender),
            Arc::clone(&self.inner.prober),
            notifier,
        );

        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let outcome = session.run().await;
            debug!(session = %id, state = ?outcome.state, "Session task finished");
        });

        // The task may already have finished and removed its entry
        if let Some(tracked) = self.inner.tracked().get_mut(&id) {
            tracked.handle = Some(handle);
        }

        id
    }

    /// Starts one session per target. An empty list starts nothing.
    pub fn wake_many(&self, targets: Vec<Target>, requester: Arc<dyn Notifier>) -> WakeMany {
        if targets.is_empty() {
            info!("Wake requested for an empty target list");
            return WakeMany::NothingToWake;
        }

        let started: Vec<(SessionId, String)> = targets
            .into_iter()
            .map(|target| {
                let name = target.name.clone();
                let id = self.wake_one(target, Arc::clone(&requester));
                (id, name)
            })
            .collect();

        info!(count = started.len(), "Wake sessions started");
        WakeMany::Started(started)
    }

    /// Probes every target concurrently, sorted by name.
    pub async fn status_all(&self, targets: Vec<Target>) -> Vec<TargetStatus> {
        let timeout = self.inner.config.probe_timeout;
        let mut probes = JoinSet::new();

        for target in targets {
            let prober = Arc::clone(&self.inner.prober);
            probes.spawn(async move {
                let online = prober.probe(target.ip, timeout).await;
                TargetStatus {
                    name: target.name,
                    ip: target.ip,
                    online,
                }
            });
        }

        let mut statuses = Vec::with_capacity(probes.len());
        while let Some(result) = probes.join_next().await {
            match result {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(error = %e, "Status probe task failed"),
            }
        }

        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Receiver for notifications from every session.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchedNotification> {
        self.inner.watchers.subscribe()
    }

    /// Sessions that have not reached a terminal state, oldest first.
    pub fn in_flight(&self) -> Vec<InFlightSession> {
        let mut sessions: Vec<InFlightSession> = self
            .inner
            .tracked()
            .values()
            .map(|t| t.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.tracked().len()
    }

    /// Aborts every running session. Used at daemon shutdown.
    ///
    /// Returns the number of sessions aborted.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<Tracked> = self.inner.tracked().drain().map(|(_, t)| t).collect();

        for tracked in &drained {
            if let Some(handle) = &tracked.handle {
                handle.abort();
            }
            debug!(session = %tracked.session.id, target = %tracked.session.name, "Session aborted");
        }

        if !drained.is_empty() {
            info!(count = drained.len(), "Aborted in-flight wake sessions");
        }
        drained.len()
    }
}
