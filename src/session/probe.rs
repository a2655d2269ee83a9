//! Reachability check run before opening a networked instrument.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default bound on a single reachability check.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `true` when `host` answers within the probe's time bound.
    async fn is_reachable(&self, host: &str) -> bool;
}

/// Single ICMP echo via the system `ping` binary.
///
/// A missing binary or a hung child counts as unreachable.
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn is_reachable(&self, host: &str) -> bool {
        // ping's -W only takes whole seconds
        let wait_secs = self.timeout.as_secs_f64().ceil().max(1.0) as u64;
        let child = Command::new("ping")
            .args(["-c", "1", "-W", &wait_secs.to_string(), host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(status)) => {
                debug!(host, success = status.success(), "Ping finished");
                status.success()
            }
            Ok(Err(e)) => {
                warn!(host, error = %e, "Could not run ping");
                false
            }
            Err(_) => {
                debug!(host, timeout_ms = self.timeout.as_millis() as u64, "Ping timed out");
                false
            }
        }
    }
}

/// Probe that reports every host reachable; used when probing is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipProbe;

#[async_trait]
impl ReachabilityProbe for SkipProbe {
    async fn is_reachable(&self, _host: &str) -> bool {
        true
    }
}

/// Host part of an instrument address (`host` or `host:port`).
pub fn probe_host(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => host,
        _ => address,
    }
}
