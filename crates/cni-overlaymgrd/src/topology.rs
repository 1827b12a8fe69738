//! Topology sync client
//!
//! Polls the central manager for the cluster's agent list and feeds every
//! snapshot to the overlay manager. Transport failures are never surfaced;
//! the client keeps retrying since the mesh cannot be built without it.

use std::time::Duration;

use cni_overlay_common::{OverlayError, OverlayResult};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::OverlayConfig;
use crate::overlay_mgr::SharedOverlayMgr;
use crate::tables::MAX_SYNC_INTERVAL_SECS;
use crate::types::Topology;

/// Manager path prefix; the agent's internal IP is appended
pub const SYNC_PATH: &str = "tenants/admin/sync";

pub struct TopologyClient {
    http: reqwest::Client,
    url: String,
    retry_backoff: Duration,
    default_interval: Duration,
    mgr: SharedOverlayMgr,
}

impl TopologyClient {
    pub fn new(config: &OverlayConfig, mgr: SharedOverlayMgr) -> OverlayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.manager.request_timeout())
            .build()
            .map_err(|e| OverlayError::http(&config.manager.url, e.to_string()))?;

        Ok(Self {
            http,
            url: sync_url(&config.manager.url, &config.agent.internal_ip),
            retry_backoff: config.manager.sync_retry(),
            default_interval: config.manager.default_interval(),
            mgr,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET against the sync endpoint
    pub async fn fetch(&self) -> OverlayResult<Topology> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| OverlayError::http(&self.url, e.to_string()))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(OverlayError::http(&self.url, format!("unexpected status {}", status)));
        }

        resp.json::<Topology>()
            .await
            .map_err(|e| OverlayError::http(&self.url, format!("invalid body: {}", e)))
    }

    /// Fetch a snapshot, retrying after a fixed backoff until one arrives
    pub async fn sync(&self) -> Topology {
        loop {
            match self.fetch().await {
                Ok(topology) => return topology,
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_secs = self.retry_backoff.as_secs_f64(),
                        "Topology sync failed, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        }
    }

    /// Hand a snapshot to the overlay manager
    pub async fn feed(&self, topology: &Topology) {
        let summary = self.mgr.lock().await.sync(topology).await;
        if summary.failed > 0 {
            warn!(failed = summary.failed, "Some peers could not be reconciled");
        }
    }

    /// Blocking first sync; returns the heartbeat interval to start with
    pub async fn init(&self) -> Duration {
        let topology = self.sync().await;
        self.feed(&topology).await;

        let interval = topology.sync_interval(self.default_interval);
        info!(
            agents = topology.agents.len(),
            interval_secs = interval.as_secs(),
            "Initial topology sync complete"
        );
        interval
    }

    /// Periodic sync at `period`
    ///
    /// Returns the new interval as soon as the manager suggests a different
    /// one, so the caller can restart at that rate.
    pub async fn heartbeat(&self, period: Duration) -> Duration {
        let period = period.clamp(
            Duration::from_secs(1),
            Duration::from_secs(MAX_SYNC_INTERVAL_SECS),
        );
        let now = Instant::now();
        let start = now.checked_add(period).unwrap_or(now);
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let topology = self.sync().await;
            self.feed(&topology).await;

            let next = topology.sync_interval(self.default_interval);
            if next != period {
                info!(
                    old_secs = period.as_secs(),
                    new_secs = next.as_secs(),
                    "Heartbeat interval changed"
                );
                return next;
            }
            debug!(agents = topology.agents.len(), "Heartbeat sync");
        }
    }

    /// Heartbeat forever, restarting whenever the interval changes
    pub async fn run(&self, mut period: Duration) {
        loop {
            period = self.heartbeat(period).await;
        }
    }
}

/// Full sync URL for the agent at `internal_ip`
pub fn sync_url(base: &str, internal_ip: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), SYNC_PATH, internal_ip)
}
