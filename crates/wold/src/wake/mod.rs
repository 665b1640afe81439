//! Wake-and-verify engine.
//!
//! One [`WakeSession`] per `(target, request)` drives the lifecycle:
//! entry probe, initial magic packet, a poll loop that probes every
//! `check_interval` and re-sends every `resend_every` attempts, and one
//! terminal notification. The [`Coordinator`] spawns sessions as independent
//! tokio tasks and tracks them while they run.
//!
//! # Seams
//!
//! Network I/O sits behind two traits so sessions can be driven by fakes:
//! - [`PacketSender`]: transmits one magic packet, never retries
//! - [`Prober`]: one bounded reachability check, every failure is `false`
//!
//! Sessions never perform transport I/O for notifications; they hand
//! [`Notification`] values to a [`Notifier`].

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use wol_core::{MacAddress, Notification};

mod coordinator;
mod packet;
mod probe;
mod session;

pub use coordinator::{Coordinator, InFlightSession, WakeMany, WatchedNotification};
pub use packet::{magic_packet, SendError, UdpPacketSender, MAGIC_PACKET_LEN};
pub use probe::{PingProber, DEFAULT_PING_PROGRAM};
pub use session::{SessionOutcome, SessionState, WakeSession};

/// Transmits Wake-on-LAN magic packets.
#[async_trait]
pub trait PacketSender: Send + Sync {
    /// Sends one magic packet for `mac`.
    ///
    /// # Errors
    ///
    /// Returns `SendError` if the transmit call fails. Implementations never
    /// retry internally.
    async fn send_wake_packet(&self, mac: MacAddress) -> Result<(), SendError>;
}

/// Checks whether a host answers on the network.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns true if `ip` answered within `timeout`.
    ///
    /// Errors and timeouts are reported as `false`.
    async fn probe(&self, ip: Ipv4Addr, timeout: Duration) -> bool;
}

/// Receives session notifications and delivers them to whoever asked.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    /// Connection that requested the session, if it came from one.
    ///
    /// Watchers skip notifications whose origin is their own connection,
    /// since the requester already receives them directly.
    fn origin(&self) -> Option<u64> {
        None
    }
}

impl Notifier for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        // Receiver gone means the requester disconnected
        let _ = self.send(notification);
    }
}
