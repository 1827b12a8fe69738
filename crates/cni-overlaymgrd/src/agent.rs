//! Agent startup wiring
//!
//! Builds every component once, in dependency order, and shares them by
//! reference. Startup is gated on the first successful topology sync.

use std::sync::Arc;
use std::time::Duration;

use cni_overlay_common::{CommandRunner, OverlayResult, TableStore};
use tracing::info;

use crate::binder::NetworkBinder;
use crate::config::OverlayConfig;
use crate::flows::FlowProgrammer;
use crate::id_alloc::IdAllocator;
use crate::overlay_mgr::{OverlayMgr, SharedOverlayMgr, TunnelSettings};
use crate::tables::{OFPORT_LIMIT, PATCH_INT_OFPORT, VLAN_ID_LIMIT};
use crate::tenant_table::TenantNetworkTable;
use crate::topology::TopologyClient;

/// A started overlay agent
pub struct OverlayAgent {
    table: Arc<TenantNetworkTable>,
    vlans: Arc<IdAllocator>,
    ofports: Arc<IdAllocator>,
    mgr: SharedOverlayMgr,
    binder: Arc<NetworkBinder>,
    client: TopologyClient,
    interval: Duration,
}

impl OverlayAgent {
    /// Bring the agent up
    ///
    /// Loads persisted state, programs the switch, restores active networks
    /// and blocks until the manager has answered once.
    pub async fn start(config: &OverlayConfig, runner: Arc<dyn CommandRunner>) -> OverlayResult<Self> {
        // VLAN 0 means untagged; ofport 1 is the patch port
        let vlans = Arc::new(IdAllocator::with_limit("vlan", VLAN_ID_LIMIT));
        vlans.init_by_history(&[0]);
        let ofports = Arc::new(IdAllocator::with_limit("tunnel-ofport", OFPORT_LIMIT));
        ofports.init_by_history(&[0, PATCH_INT_OFPORT]);

        let table = Arc::new(TenantNetworkTable::new(TableStore::new(&config.store.dir)));
        table.load()?;

        let flows = FlowProgrammer::new(runner.clone(), &config.switch);
        flows.init().await?;

        let settings = TunnelSettings {
            self_ip: config.agent.internal_ip.clone(),
            local_ip: config.local_tunnel_ip().to_string(),
            dst_port: config.switch.vxlan_dst_port,
            command_attempts: config.switch.command_attempts,
            command_retry_delay: config.switch.command_retry_delay(),
        };
        let mgr = OverlayMgr::new(runner, flows, ofports.clone(), settings);
        mgr.purge_stale_ports().await?;
        let mgr = mgr.into_shared();

        let binder = Arc::new(NetworkBinder::new(table.clone(), vlans.clone(), mgr.clone()));
        binder.restore().await?;

        let client = TopologyClient::new(config, mgr.clone())?;
        info!(url = client.url(), "Waiting for initial topology");
        let interval = client.init().await;

        info!(
            networks = table.len(),
            interval_secs = interval.as_secs(),
            "Overlay agent started"
        );

        Ok(Self {
            table,
            vlans,
            ofports,
            mgr,
            binder,
            client,
            interval,
        })
    }

    /// Attach/detach entry point for the CNI pipeline
    pub fn binder(&self) -> Arc<NetworkBinder> {
        self.binder.clone()
    }

    pub fn overlay(&self) -> SharedOverlayMgr {
        self.mgr.clone()
    }

    pub fn table(&self) -> &TenantNetworkTable {
        &self.table
    }

    pub fn vlans(&self) -> &IdAllocator {
        &self.vlans
    }

    pub fn ofports(&self) -> &IdAllocator {
        &self.ofports
    }

    /// Heartbeat interval negotiated at startup
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the heartbeat loop; never returns
    pub async fn run(&self) {
        self.client.run(self.interval).await
    }
}
