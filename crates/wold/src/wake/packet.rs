//! Magic packet construction and UDP transmission.

use std::net::{Ipv4Addr, SocketAddrV4};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

use wol_core::{MacAddress, WakeConfig};

use super::PacketSender;

/// Length of the synchronization stream (six `0xFF` bytes).
const SYNC_LEN: usize = 6;

/// Number of times the MAC is repeated after the synchronization stream.
const MAC_REPEATS: usize = 16;

/// Total magic packet size: 6 + 16 * 6 bytes.
pub const MAGIC_PACKET_LEN: usize = SYNC_LEN + MAC_REPEATS * 6;

/// Builds the 102-byte magic payload for `mac`.
pub fn magic_packet(mac: MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFF; MAGIC_PACKET_LEN];
    let octets = mac.octets();
    for (byte, src) in packet.iter_mut().skip(SYNC_LEN).zip(octets.iter().cycle()) {
        *byte = *src;
    }
    packet
}

/// Errors raised while transmitting a magic packet.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("failed to open UDP socket: {0}")]
    Socket(String),

    #[error("failed to enable broadcast: {0}")]
    Broadcast(String),

    #[error("failed to send to {destination}: {reason}")]
    Transmit {
        destination: SocketAddrV4,
        reason: String,
    },

    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },
}

/// Sends magic packets as a single UDP datagram to a broadcast (or unicast)
/// destination.
#[derive(Debug, Clone)]
pub struct UdpPacketSender {
    destination: SocketAddrV4,
}

impl UdpPacketSender {
    pub fn new(destination: SocketAddrV4) -> Self {
        Self { destination }
    }

    /// Uses the broadcast address and port from the wake configuration.
    pub fn from_config(config: &WakeConfig) -> Self {
        Self::new(SocketAddrV4::new(config.broadcast, config.port))
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.destination
    }
}

#[async_trait]
impl PacketSender for UdpPacketSender {
    async fn send_wake_packet(&self, mac: MacAddress) -> Result<(), SendError> {
        let packet = magic_packet(mac);

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| SendError::Socket(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| SendError::Broadcast(e.to_string()))?;

        let sent = socket
            .send_to(&packet, self.destination)
            .await
            .map_err(|e| SendError::Transmit {
                destination: self.destination,
                reason: e.to_string(),
            })?;

        if sent != MAGIC_PACKET_LEN {
            return Err(SendError::ShortWrite {
                sent,
                expected: MAGIC_PACKET_LEN,
            });
        }

        debug!(mac = %mac, destination = %self.destination, "Magic packet sent");
        Ok(())
    }
}
