//! Network binder
//!
//! Entry point for the attach/detach pipeline. The first pod of a network
//! on this host realizes it (VLAN allocation, table record, flow rules);
//! the last pod leaving tears it down again.

use std::sync::Arc;

use cni_overlay_common::{OverlayError, OverlayResult};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::id_alloc::IdAllocator;
use crate::overlay_mgr::SharedOverlayMgr;
use crate::tables::TENANT_NETWORK_TABLE;
use crate::tenant_table::TenantNetworkTable;

pub struct NetworkBinder {
    table: Arc<TenantNetworkTable>,
    vlans: Arc<IdAllocator>,
    mgr: SharedOverlayMgr,
    /// Serializes realize/teardown decisions across requests
    guard: Mutex<()>,
}

impl NetworkBinder {
    pub fn new(table: Arc<TenantNetworkTable>, vlans: Arc<IdAllocator>, mgr: SharedOverlayMgr) -> Self {
        Self {
            table,
            vlans,
            mgr,
            guard: Mutex::new(()),
        }
    }

    /// Attach pod `namespace/name` to `network_id`, returning its local VLAN
    #[instrument(skip(self))]
    pub async fn attach(&self, network_id: &str, vni: u32, namespace: &str, name: &str) -> OverlayResult<u16> {
        let _guard = self.guard.lock().await;

        let vlan_id = match self.table.get(network_id) {
            Ok(entry) => {
                let vlan_id = entry.vlan().ok_or_else(|| {
                    OverlayError::internal(format!(
                        "{} has invalid VLAN '{}'",
                        network_id, entry.vlan_id
                    ))
                })?;
                if entry.vni != vni {
                    return Err(OverlayError::NetworkExists {
                        network_id: network_id.to_string(),
                        vni: entry.vni,
                        vlan_id,
                    });
                }
                vlan_id
            }
            Err(e) if e.is_not_found() => self.realize(network_id, vni).await?,
            Err(e) => return Err(e),
        };

        self.table.inc_ref_count(network_id, namespace, name)?;
        Ok(vlan_id)
    }

    /// Detach pod `namespace/name`; returns true if the network was torn down
    #[instrument(skip(self))]
    pub async fn detach(&self, network_id: &str, namespace: &str, name: &str) -> OverlayResult<bool> {
        let _guard = self.guard.lock().await;

        self.table.dec_ref_count(network_id, namespace, name)?;
        if !self.table.need_delete(network_id) {
            return Ok(false);
        }

        let entry = self.table.get(network_id)?;
        if let Err(e) = self.mgr.lock().await.remove_network(network_id).await {
            if !e.is_not_found() {
                return Err(e);
            }
            warn!(network_id, "Network was not active in the overlay");
        }

        self.table.delete(network_id)?;
        if let Some(vlan_id) = entry.vlan() {
            self.vlans.free(u32::from(vlan_id));
        }

        info!(network_id, vni = entry.vni, vlan_id = %entry.vlan_id, "Network released");
        Ok(true)
    }

    /// Re-activate persisted networks after a restart
    ///
    /// VLANs of every persisted record are reserved first. Records without
    /// pods, and records the overlay rejects, are dropped. Returns the
    /// number of networks re-activated.
    pub async fn restore(&self) -> OverlayResult<usize> {
        let _guard = self.guard.lock().await;
        let entries = self.table.entries();

        let history: Vec<u32> = entries
            .values()
            .filter_map(|e| e.vlan())
            .map(u32::from)
            .collect();
        self.vlans.init_by_history(&history);

        let mut restored = 0;
        for (network_id, entry) in &entries {
            let Some(vlan_id) = entry.vlan() else {
                warn!(network_id, vlan_id = %entry.vlan_id, "Dropping record with invalid VLAN");
                self.table.delete(network_id)?;
                continue;
            };

            if entry.pod_ids.is_empty() {
                self.table.delete(network_id)?;
                self.vlans.free(u32::from(vlan_id));
                continue;
            }

            let result = self
                .mgr
                .lock()
                .await
                .add_network(network_id, entry.vni, vlan_id)
                .await;
            match result {
                Ok(()) => restored += 1,
                Err(e) => {
                    warn!(network_id, error = %e, "Dropping network that cannot be restored");
                    self.table.delete(network_id)?;
                    // The VLAN stays reserved while another record holds it
                    let shared = entries
                        .iter()
                        .any(|(id, other)| id != network_id && other.vlan() == Some(vlan_id));
                    if !shared {
                        self.vlans.free(u32::from(vlan_id));
                    }
                }
            }
        }

        info!(restored, table = TENANT_NETWORK_TABLE, "Restored tenant networks");
        Ok(restored)
    }

    /// First use of `network_id` on this host
    async fn realize(&self, network_id: &str, vni: u32) -> OverlayResult<u16> {
        let raw = self.vlans.alloc()?;
        let vlan_id = match u16::try_from(raw) {
            Ok(v) => v,
            Err(_) => {
                self.vlans.free(raw);
                return Err(OverlayError::internal(format!("VLAN {} out of range", raw)));
            }
        };

        if let Err(e) = self.mgr.lock().await.add_network(network_id, vni, vlan_id).await {
            self.vlans.free(raw);
            return Err(e);
        }

        if let Err(e) = self.table.insert(network_id, vni, vlan_id) {
            if let Err(undo) = self.mgr.lock().await.remove_network(network_id).await {
                warn!(network_id, error = %undo, "Failed to roll back network");
            }
            if let Err(undo) = self.table.delete(network_id) {
                warn!(network_id, error = %undo, "Failed to roll back table record");
            }
            self.vlans.free(raw);
            return Err(e);
        }

        info!(network_id, vni, vlan_id, "Network realized");
        Ok(vlan_id)
    }
}
