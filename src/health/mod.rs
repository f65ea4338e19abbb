//! Health probe for the local agent bridge.
//!
//! Independent of the message bus: a plain HTTP GET against the bridge's
//! health endpoint. Any failure reads as [`SystemHealth::Offline`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::utils::error::HealthError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub uptime_sec: f64,
    #[serde(default)]
    pub mqtt_connected: bool,
    #[serde(default)]
    pub agent_running: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthReport {
    /// `false` when the bridge reports itself degraded.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    pub fn uptime(&self) -> String {
        format_uptime(self.uptime_sec.max(0.0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemHealth {
    Online(HealthReport),
    Offline,
}

impl SystemHealth {
    pub fn is_online(&self) -> bool {
        matches!(self, SystemHealth::Online(_))
    }
}

/// `3725` seconds reads as `1h 2m`.
pub fn format_uptime(seconds: u64) -> String {
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
}

#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, HealthError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<HealthReport, HealthError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HealthError::Status(status));
        }
        Ok(response.json::<HealthReport>().await?)
    }

    pub async fn check(&self) -> SystemHealth {
        match self.fetch().await {
            Ok(report) => SystemHealth::Online(report),
            Err(e) => {
                debug!("health check against {} failed: {e}", self.url);
                SystemHealth::Offline
            }
        }
    }
}

/// Shortest interval between two health probes.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Probes every `period` (at least [`MIN_PROBE_INTERVAL`]), publishing each
/// result on the returned channel. The channel starts out `Offline`.
pub fn spawn_health_poller(
    probe: HealthProbe,
    period: Duration,
) -> (watch::Receiver<SystemHealth>, JoinHandle<()>) {
    if period < MIN_PROBE_INTERVAL {
        warn!("health interval {:?} raised to {:?}", period, MIN_PROBE_INTERVAL);
    }
    let period = period.max(MIN_PROBE_INTERVAL);
    let (tx, rx) = watch::channel(SystemHealth::Offline);
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let health = probe.check().await;
            tx.send_if_modified(|current| {
                if current.is_online() != health.is_online() {
                    info!(
                        "system {}",
                        if health.is_online() { "online" } else { "offline" }
                    );
                }
                if *current == health {
                    false
                } else {
                    *current = health;
                    true
                }
            });
            if tx.is_closed() {
                return;
            }
        }
    });
    (rx, task)
}

#[cfg(test)]
mod tests;
