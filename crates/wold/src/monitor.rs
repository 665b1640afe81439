//! Periodic health logging for the daemon.
//!
//! Samples the daemon's own memory and CPU through `sysinfo` together with
//! the number of wake sessions still running, and logs one line per
//! interval. A warning is logged when memory or CPU crosses its threshold.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A process missing from the sysinfo snapshot reads as zero usage

use std::process;
use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::wake::Coordinator;

/// Memory usage warning threshold in MB.
pub const HIGH_MEMORY_THRESHOLD_MB: u64 = 64;

/// CPU usage warning threshold (percentage).
pub const HIGH_CPU_THRESHOLD_PERCENT: f32 = 50.0;

/// How often to sample.
pub const METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// One health sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonMetrics {
    pub memory_mb: u64,
    pub cpu_percent: f32,
    /// Wake sessions that have not reached a terminal state
    pub in_flight: usize,
    pub memory_high: bool,
    pub cpu_high: bool,
}

/// Samples resource usage of the current process.
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
    memory_threshold_mb: u64,
    cpu_threshold_percent: f32,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self::with_thresholds(HIGH_MEMORY_THRESHOLD_MB, HIGH_CPU_THRESHOLD_PERCENT)
    }

    pub fn with_thresholds(memory_threshold_mb: u64, cpu_threshold_percent: f32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
            memory_threshold_mb,
            cpu_threshold_percent,
        }
    }

    /// Takes a sample. CPU usage is relative to the previous call, so the
    /// first sample reads close to zero.
    pub fn sample(&mut self, in_flight: usize) -> DaemonMetrics {
        // CPU usage is only computed by a full refresh
        self.system.refresh_all();

        let (memory_bytes, cpu_percent) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory(), p.cpu_usage()))
            .unwrap_or((0, 0.0));

        let memory_mb = memory_bytes / 1024 / 1024;
        DaemonMetrics {
            memory_mb,
            cpu_percent,
            in_flight,
            memory_high: memory_mb > self.memory_threshold_mb,
            cpu_high: cpu_percent > self.cpu_threshold_percent,
        }
    }

    pub fn memory_threshold_mb(&self) -> u64 {
        self.memory_threshold_mb
    }

    pub fn cpu_threshold_percent(&self) -> f32 {
        self.cpu_threshold_percent
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the monitoring task; it stops when `cancel_token` fires.
pub fn spawn_monitor_task(coordinator: Coordinator, cancel_token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = ProcessMonitor::new();
        let mut tick = interval(METRICS_INTERVAL);

        // Baseline for the CPU delta
        let _ = monitor.sample(0);

        info!(
            memory_threshold_mb = monitor.memory_threshold_mb(),
            cpu_threshold_percent = monitor.cpu_threshold_percent(),
            interval_secs = METRICS_INTERVAL.as_secs(),
            "Process monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Process monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let metrics = monitor.sample(coordinator.in_flight_count());
                    log_metrics(&metrics);
                    for session in coordinator.in_flight() {
                        debug!(
                            session = %session.id,
                            target = %session.name,
                            started_at = %session.started_at,
                            "Wake session in flight"
                        );
                    }
                }
            }
        }

        debug!("Process monitor task completed");
    })
}

fn log_metrics(metrics: &DaemonMetrics) {
    let cpu = format!("{:.1}", metrics.cpu_percent);
    if metrics.memory_high || metrics.cpu_high {
        warn!(
            memory_mb = metrics.memory_mb,
            cpu_percent = cpu,
            in_flight = metrics.in_flight,
            memory_high = metrics.memory_high,
            cpu_high = metrics.cpu_high,
            "Daemon resource usage above threshold"
        );
    } else {
        info!(
            memory_mb = metrics.memory_mb,
            cpu_percent = cpu,
            in_flight = metrics.in_flight,
            "Daemon health"
        );
    }
}
