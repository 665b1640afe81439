//! Wake session state machine.
//!
//! ```text
//!            entry probe
//!   Idle ─────────────────▶ AlreadyOnline
//!     │ offline
//!     ▼  initial send
//!   Sending ──── error ────▶ SendFailed
//!     │ ok
//!     ▼
//!   Polling ──┬─ probe ok ─▶ Online
//!     ▲       │
//!     └ wait ─┘ budget used ─▶ Exhausted
//! ```
//!
//! The only suspension points are the bounded probe and the wait between
//! attempts. Every session emits exactly one terminal event, always last.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use wol_core::{Notification, SessionId, Target, WakeConfig, WakeEvent};

use super::{Notifier, PacketSender, Prober};

/// Lifecycle state of a wake session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, entry probe not yet done
    Idle,
    /// Target was offline; sending the initial packet
    Sending,
    /// Poll loop running
    Polling,
    /// Entry probe succeeded (terminal)
    AlreadyOnline,
    /// Initial packet could not be sent (terminal)
    SendFailed,
    /// Target answered during polling (terminal)
    Online,
    /// Poll budget used up (terminal)
    Exhausted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyOnline | Self::SendFailed | Self::Online | Self::Exhausted
        )
    }
}

/// Final result of a session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub state: SessionState,
    /// Poll loop attempts performed (0 if polling never started)
    pub attempts: u32,
}

/// One wake-and-verify attempt for a single target.
///
/// Holds its own target snapshot and shares nothing mutable with other
/// sessions.
pub struct WakeSession {
    id: SessionId,
    target: Target,
    config: Arc<WakeConfig>,
    sender: Arc<dyn PacketSender>,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    state: SessionState,
    attempts: u32,
}

impl WakeSession {
    pub fn new(
        id: SessionId,
        target: Target,
        config: Arc<WakeConfig>,
        sender: Arc<dyn PacketSender>,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            id,
            target,
            config,
            sender,
            prober,
            notifier,
            state: SessionState::Idle,
            attempts: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to its terminal state.
    pub async fn run(mut self) -> SessionOutcome {
        info!(
            session = %self.id,
            target = %self.target.name,
            mac = %self.target.mac,
            ip = %self.target.ip,
            "Wake session started"
        );

        if self.probe().await {
            self.finish(SessionState::AlreadyOnline);
            return self.outcome();
        }

        self.transition(SessionState::Sending);
        if let Err(e) = self.sender.send_wake_packet(self.target.mac).await {
            warn!(session = %self.id, target = %self.target.name, error = %e, "Initial wake packet failed");
            self.finish(SessionState::SendFailed);
            self.emit(WakeEvent::SendFailed {
                name: self.target.name.clone(),
                error: e.to_string(),
            });
            return self.outcome();
        }
        self.emit(WakeEvent::PacketSent {
            name: self.target.name.clone(),
        });

        self.transition(SessionState::Polling);
        while self.attempts < self.config.max_tries {
            sleep(self.config.check_interval).await;
            self.attempts += 1;

            if self.probe().await {
                self.finish(SessionState::Online);
                return self.outcome();
            }

            if self.config.is_resend_attempt(self.attempts) {
                self.resend().await;
            }
        }

        self.finish(SessionState::Exhausted);
        self.outcome()
    }

    async fn probe(&self) -> bool {
        let reachable = self
            .prober
            .probe(self.target.ip, self.config.probe_timeout)
            .await;
        debug!(
            session = %self.id,
            ip = %self.target.ip,
            attempt = self.attempts,
            reachable,
            "Probe finished"
        );
        reachable
    }

    /// Periodic resend; failures are reported but never end the session.
    async fn resend(&self) {
        match self.sender.send_wake_packet(self.target.mac).await {
            Ok(()) => {
                debug!(session = %self.id, attempt = self.attempts, "Wake packet re-sent");
            }
            Err(e) => {
                warn!(
                    session = %self.id,
                    target = %self.target.name,
                    attempt = self.attempts,
                    error = %e,
                    "Wake packet resend failed"
                );
                self.emit(WakeEvent::ResendFailed {
                    name: self.target.name.clone(),
                    attempt: self.attempts,
                    error: e.to_string(),
                });
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
    }

    /// Moves to a terminal state and emits its event (except `SendFailed`,
    /// whose event carries the error and is emitted by the caller).
    fn finish(&mut self, terminal: SessionState) {
        self.transition(terminal);

        let name = self.target.name.clone();
        let event = match terminal {
            SessionState::AlreadyOnline => WakeEvent::AlreadyOnline { name },
            SessionState::Online => WakeEvent::Online {
                name,
                attempts: self.attempts,
            },
            SessionState::Exhausted => WakeEvent::Exhausted {
                name,
                attempts: self.attempts,
            },
            _ => return,
        };

        info!(
            session = %self.id,
            target = %self.target.name,
            state = ?terminal,
            attempts = self.attempts,
            "Wake session finished"
        );
        self.emit(event);
    }

    fn emit(&self, event: WakeEvent) {
        self.notifier.notify(Notification::now(self.id, event));
    }

    fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            state: self.state,
            attempts: self.attempts,
        }
    }
}
