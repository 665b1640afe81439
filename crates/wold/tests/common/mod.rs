//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wol_core::{MacAddress, Target, WakeConfig};
use wold::wake::{Coordinator, PacketSender, Prober, SendError};

/// Hosts that start answering after a number of failed probes.
///
/// Unknown hosts never answer.
#[derive(Default)]
pub struct FakeNetwork {
    answers_after: HashMap<Ipv4Addr, usize>,
    probes: Mutex<HashMap<Ipv4Addr, usize>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ip` fails its first `failed` probes, then answers.
    pub fn host(mut self, ip: &str, failed: usize) -> Self {
        self.answers_after.insert(ip.parse().unwrap(), failed);
        self
    }

    pub fn probe_count(&self, ip: &str) -> usize {
        let ip: Ipv4Addr = ip.parse().unwrap();
        self.probes.lock().unwrap().get(&ip).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Prober for FakeNetwork {
    async fn probe(&self, ip: Ipv4Addr, _timeout: Duration) -> bool {
        let count = {
            let mut probes = self.probes.lock().unwrap();
            let count = probes.entry(ip).or_insert(0);
            *count += 1;
            *count
        };
        self.answers_after
            .get(&ip)
            .is_some_and(|failed| count > *failed)
    }
}

/// Records every MAC it is asked to wake.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<MacAddress>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<MacAddress> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PacketSender for RecordingSender {
    async fn send_wake_packet(&self, mac: MacAddress) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(mac);
        Ok(())
    }
}

pub fn config(max_tries: u32, check_interval: Duration) -> WakeConfig {
    WakeConfig {
        max_tries,
        check_interval,
        resend_every: 3,
        probe_timeout: check_interval / 4,
        ..WakeConfig::default()
    }
}

pub fn coordinator(
    config: WakeConfig,
    network: Arc<FakeNetwork>,
    sender: Arc<RecordingSender>,
) -> Coordinator {
    Coordinator::new(Arc::new(config), sender, network)
}

pub fn target(name: &str, mac: &str, ip: &str) -> Target {
    Target::parse(name, mac, ip).unwrap()
}
