//! Overlay Manager - tunnel mesh and tenant network reconciliation
//!
//! Holds the peers' tunnel ports and the tenant networks active on this
//! host. Any change to either list triggers a full flow rebuild.
//!
//! Per-peer lifecycle:
//!
//! ```text
//! Unknown --ready--> Linked --down--> Unlinked --ready--> Linked
//! ```
//!
//! Records are never removed, so the port list grows only with the number
//! of distinct peers ever observed.

use std::sync::Arc;
use std::time::Duration;

use cni_overlay_common::shell::run_with_retry;
use cni_overlay_common::{CommandRunner, OverlayError, OverlayResult};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::commands::{build_add_vxlan_port_cmd, build_del_port_cmd, build_list_ports_cmd};
use crate::flows::FlowProgrammer;
use crate::id_alloc::IdAllocator;
use crate::tables::TUNNEL_PORT_PREFIX;
use crate::types::{tunnel_port_name, Agent, AgentStatus, Topology, TunNet, TunPort, VxlanPort};

/// Handle shared by the topology client and the attach/detach path
///
/// Every caller holds the lock for a whole logical operation, so updates
/// are serialized.
pub type SharedOverlayMgr = Arc<Mutex<OverlayMgr>>;

/// Settings for tunnel port management
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    /// Internal IP identifying this agent in topology snapshots
    pub self_ip: String,
    /// Local VXLAN endpoint
    pub local_ip: String,
    pub dst_port: u16,
    pub command_attempts: u32,
    pub command_retry_delay: Duration,
}

/// Result of one topology pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub linked: usize,
    pub unlinked: usize,
    pub failed: usize,
}

/// Overlay Manager
pub struct OverlayMgr {
    runner: Arc<dyn CommandRunner>,
    flows: FlowProgrammer,
    ofports: Arc<IdAllocator>,
    settings: TunnelSettings,

    /// Tenant networks active on this host
    networks: Vec<TunNet>,

    /// One record per peer ever seen
    ports: Vec<TunPort>,
}

impl OverlayMgr {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        flows: FlowProgrammer,
        ofports: Arc<IdAllocator>,
        settings: TunnelSettings,
    ) -> Self {
        info!(self_ip = %settings.self_ip, local_ip = %settings.local_ip, "OverlayMgr initialized");

        Self {
            runner,
            flows,
            ofports,
            settings,
            networks: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedOverlayMgr {
        Arc::new(Mutex::new(self))
    }

    pub fn networks(&self) -> &[TunNet] {
        &self.networks
    }

    pub fn ports(&self) -> &[TunPort] {
        &self.ports
    }

    /// ofports of every linked tunnel, in record order
    pub fn linked_ofports(&self) -> Vec<u32> {
        self.ports.iter().filter_map(TunPort::ofport).collect()
    }

    /// Activate a tenant network on this host
    ///
    /// Fails with `NetworkExists` if the id, VNI or VLAN is already in use.
    #[instrument(skip(self))]
    pub async fn add_network(&mut self, network_id: &str, vni: u32, vlan_id: u16) -> OverlayResult<()> {
        let net = TunNet::new(network_id, vni, vlan_id);
        if self.networks.iter().any(|n| n.collides_with(&net)) {
            return Err(OverlayError::NetworkExists {
                network_id: network_id.to_string(),
                vni,
                vlan_id,
            });
        }

        self.networks.push(net);
        info!(network_id, vni, vlan_id, "Network added");
        self.rebuild().await;
        Ok(())
    }

    /// Deactivate a tenant network
    #[instrument(skip(self))]
    pub async fn remove_network(&mut self, network_id: &str) -> OverlayResult<()> {
        let idx = self
            .networks
            .iter()
            .position(|n| n.network_id == network_id)
            .ok_or_else(|| OverlayError::network_not_found(network_id))?;

        self.networks.remove(idx);
        info!(network_id, "Network removed");
        self.rebuild().await;
        Ok(())
    }

    /// Reconcile tunnel ports against a topology snapshot
    ///
    /// Failures on one peer are logged and do not stop the pass.
    #[instrument(skip(self, topology), fields(agents = topology.agents.len()))]
    pub async fn sync(&mut self, topology: &Topology) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for agent in &topology.agents {
            if agent.ip == self.settings.self_ip {
                continue;
            }

            // (linked, last known ip) of the peer's record
            let current = self
                .ports
                .iter()
                .find(|p| p.peer_id() == agent.id)
                .map(|p| (p.is_linked(), p.agent().ip.clone()));

            let result = match (agent.status, current) {
                (AgentStatus::Ready, None) | (AgentStatus::Ready, Some((false, _))) => {
                    self.create_link(agent).await.map(|_| summary.linked += 1)
                }
                (AgentStatus::Ready, Some((true, old_ip))) if old_ip != agent.ip => {
                    info!(peer = %agent.id, %old_ip, new_ip = %agent.ip, "Peer address changed, relinking");
                    match self.delete_link(agent).await {
                        Ok(()) => self.create_link(agent).await.map(|_| summary.linked += 1),
                        Err(e) => Err(e),
                    }
                }
                (AgentStatus::Down, Some((true, _))) => {
                    self.delete_link(agent).await.map(|_| summary.unlinked += 1)
                }
                _ => Ok(()),
            };

            if let Err(e) = result {
                summary.failed += 1;
                warn!(peer = %agent.id, ip = %agent.ip, error = %e, "Failed to reconcile peer");
            }
        }

        debug!(
            linked = summary.linked,
            unlinked = summary.unlinked,
            failed = summary.failed,
            "Topology sync pass complete"
        );
        summary
    }

    /// Create the tunnel port to `agent` and mark its record linked
    async fn create_link(&mut self, agent: &Agent) -> OverlayResult<u32> {
        let ofport = self.ofports.alloc()?;
        let port = VxlanPort {
            name: tunnel_port_name(ofport),
            ofport,
            remote_ip: agent.ip.clone(),
            local_ip: self.settings.local_ip.clone(),
            dst_port: self.settings.dst_port,
        };

        let cmd = build_add_vxlan_port_cmd(self.flows.tunnel_bridge(), &port);
        if let Err(e) = self.run_with_retry(&cmd).await {
            self.ofports.free(ofport);
            return Err(e);
        }

        let record = TunPort::Linked {
            ofport,
            agent: agent.clone(),
        };
        match self.ports.iter_mut().find(|p| p.peer_id() == agent.id) {
            Some(existing) => *existing = record,
            None => self.ports.push(record),
        }

        info!(peer = %agent.id, ip = %agent.ip, ofport, port = %port.name, "Tunnel linked");
        self.rebuild().await;
        Ok(ofport)
    }

    /// Remove the tunnel port to `agent` and mark its record unlinked
    async fn delete_link(&mut self, agent: &Agent) -> OverlayResult<()> {
        let Some(idx) = self.ports.iter().position(|p| p.peer_id() == agent.id) else {
            return Ok(());
        };
        let Some(ofport) = self.ports[idx].ofport() else {
            return Ok(());
        };

        let name = tunnel_port_name(ofport);
        let cmd = build_del_port_cmd(self.flows.tunnel_bridge(), &name);
        self.run_with_retry(&cmd).await?;

        self.ofports.free(ofport);
        let known = self.ports[idx].agent().clone();
        self.ports[idx] = TunPort::Unlinked {
            agent: Agent {
                status: agent.status,
                ..known
            },
        };

        info!(peer = %agent.id, ofport, port = %name, "Tunnel unlinked");
        self.rebuild().await;
        Ok(())
    }

    /// Delete tunnel ports left on the bridge by a previous process
    ///
    /// Must run before the first sync; tunnel ports are not persisted.
    pub async fn purge_stale_ports(&self) -> OverlayResult<usize> {
        let bridge = self.flows.tunnel_bridge();
        let out = self.runner.run(&build_list_ports_cmd(bridge)).await?;

        let mut purged = 0;
        for name in out
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with(TUNNEL_PORT_PREFIX))
        {
            match self.runner.run(&build_del_port_cmd(bridge, name)).await {
                Ok(_) => purged += 1,
                Err(e) => warn!(port = name, error = %e, "Failed to delete stale tunnel port"),
            }
        }

        if purged > 0 {
            info!(purged, "Removed stale tunnel ports");
        }
        Ok(purged)
    }

    async fn rebuild(&self) {
        self.flows.update(&self.networks, &self.ports).await;
    }

    async fn run_with_retry(&self, cmd: &str) -> OverlayResult<String> {
        run_with_retry(
            self.runner.as_ref(),
            cmd,
            self.settings.command_attempts,
            self.settings.command_retry_delay,
        )
        .await
    }
}
