//! Tenant network table
//!
//! Maps a network id to its tunnel key, local VLAN and the set of pods on
//! this host referencing it. The whole table is written to the store after
//! every mutation, while the lock is still held.
//!
//! The in-memory table is mutated before the snapshot is written and is not
//! rolled back if the write fails; the persistence error is returned to the
//! caller.

use std::collections::BTreeMap;

use cni_overlay_common::{OverlayError, OverlayResult, TableStore};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::tables::TENANT_NETWORK_TABLE;
use crate::types::{pod_key, TenantNetworkValue};

/// Network id -> record, ordered for stable snapshots
pub type TenantNetworks = BTreeMap<String, TenantNetworkValue>;

/// Persisted registry of tenant networks realized on this host
#[derive(Debug)]
pub struct TenantNetworkTable {
    store: TableStore,
    entries: RwLock<TenantNetworks>,
}

impl TenantNetworkTable {
    pub fn new(store: TableStore) -> Self {
        Self {
            store,
            entries: RwLock::new(TenantNetworks::new()),
        }
    }

    /// Replay the persisted snapshot into memory
    ///
    /// Must run once before any other call. A missing file loads as empty.
    pub fn load(&self) -> OverlayResult<()> {
        let mut entries = self.entries.write();
        *entries = self.store.load(TENANT_NETWORK_TABLE)?;
        info!(networks = entries.len(), "Loaded tenant network table");
        Ok(())
    }

    /// Create `network_id` with an empty pod set
    pub fn insert(&self, network_id: &str, vni: u32, vlan_id: u16) -> OverlayResult<()> {
        let mut entries = self.entries.write();
        entries.insert(
            network_id.to_string(),
            TenantNetworkValue::new(vni, vlan_id.to_string()),
        );
        debug!(network_id, vni, vlan_id, "Inserted tenant network");
        self.persist(&entries)
    }

    pub fn get(&self, network_id: &str) -> OverlayResult<TenantNetworkValue> {
        self.entries
            .read()
            .get(network_id)
            .cloned()
            .ok_or_else(|| OverlayError::not_found(TENANT_NETWORK_TABLE, network_id))
    }

    /// Record that pod `namespace/name` uses `network_id`
    ///
    /// Adding a pod that is already referenced is a no-op.
    pub fn inc_ref_count(&self, network_id: &str, namespace: &str, name: &str) -> OverlayResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(network_id)
            .ok_or_else(|| OverlayError::not_found(TENANT_NETWORK_TABLE, network_id))?;
        entry.pod_ids.insert(pod_key(namespace, name));
        debug!(network_id, namespace, name, refs = entry.pod_ids.len(), "Pod reference added");
        self.persist(&entries)
    }

    /// Drop pod `namespace/name` from `network_id`
    ///
    /// Removing a pod that is not referenced is a no-op.
    pub fn dec_ref_count(&self, network_id: &str, namespace: &str, name: &str) -> OverlayResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(network_id)
            .ok_or_else(|| OverlayError::not_found(TENANT_NETWORK_TABLE, network_id))?;
        entry.pod_ids.remove(&pod_key(namespace, name));
        debug!(network_id, namespace, name, refs = entry.pod_ids.len(), "Pod reference removed");
        self.persist(&entries)
    }

    /// True iff the network exists and no pod references it
    pub fn need_delete(&self, network_id: &str) -> bool {
        self.entries
            .read()
            .get(network_id)
            .is_some_and(|e| e.pod_ids.is_empty())
    }

    /// Remove `network_id`; removing an absent network is a no-op
    pub fn delete(&self, network_id: &str) -> OverlayResult<()> {
        let mut entries = self.entries.write();
        if entries.remove(network_id).is_none() {
            return Ok(());
        }
        debug!(network_id, "Deleted tenant network");
        self.persist(&entries)
    }

    /// Snapshot of every record
    pub fn entries(&self) -> TenantNetworks {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn persist(&self, entries: &TenantNetworks) -> OverlayResult<()> {
        self.store.save(TENANT_NETWORK_TABLE, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn table_in(dir: &tempfile::TempDir) -> TenantNetworkTable {
        let table = TenantNetworkTable::new(TableStore::new(dir.path()));
        table.load().unwrap();
        table
    }

    #[test]
    fn test_insert_get_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);

        table.insert("net-A", 100, 37).unwrap();
        assert_eq!(
            table.get("net-A").unwrap(),
            TenantNetworkValue {
                vni: 100,
                vlan_id: "37".to_string(),
                pod_ids: BTreeSet::new(),
            }
        );
        assert!(table.need_delete("net-A"));

        table.inc_ref_count("net-A", "ns", "pod").unwrap();
        assert!(!table.need_delete("net-A"));

        table.dec_ref_count("net-A", "ns", "pod").unwrap();
        assert!(table.need_delete("net-A"));
    }

    #[test]
    fn test_ref_counting_is_set_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        table.insert("net", 1, 10).unwrap();

        table.inc_ref_count("net", "ns1", "pod1").unwrap();
        table.inc_ref_count("net", "ns1", "pod1").unwrap();
        assert_eq!(table.get("net").unwrap().pod_ids.len(), 1);

        table.dec_ref_count("net", "ns1", "absent").unwrap();
        assert_eq!(table.get("net").unwrap().pod_ids.len(), 1);

        table.inc_ref_count("net", "ns2", "pod1").unwrap();
        assert_eq!(table.get("net").unwrap().pod_ids.len(), 2);
    }

    #[test]
    fn test_missing_network() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);

        assert!(table.get("nope").unwrap_err().is_not_found());
        assert!(table.inc_ref_count("nope", "ns", "p").unwrap_err().is_not_found());
        assert!(table.dec_ref_count("nope", "ns", "p").unwrap_err().is_not_found());
        assert!(!table.need_delete("nope"));
        table.delete("nope").unwrap();
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        table.insert("net", 1, 10).unwrap();
        table.delete("net").unwrap();
        assert!(table.is_empty());
        assert!(table.get("net").is_err());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let table = table_in(&dir);
            table.insert("net-A", 100, 37).unwrap();
            table.insert("net-B", 200, 38).unwrap();
            table.inc_ref_count("net-B", "default", "web-0").unwrap();
        }

        let restarted = table_in(&dir);
        assert_eq!(restarted.len(), 2);
        assert_eq!(restarted.get("net-A").unwrap(), TenantNetworkValue::new(100, "37"));

        let b = restarted.get("net-B").unwrap();
        assert_eq!(b.vni, 200);
        assert_eq!(b.vlan_id, "38");
        assert!(b.pod_ids.contains("default:web-0"));
    }

    #[test]
    fn test_snapshot_format() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(&dir);
        table.insert("net-A", 100, 37).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("tenant_networks.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            doc,
            serde_json::json!({"net-A": {"VNI": 100, "VlanID": "37", "PodIDs": []}})
        );
        assert!(raw.contains("\n  "));
    }

    #[test]
    fn test_persist_failure_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let table = TenantNetworkTable::new(TableStore::new(&blocker));
        let err = table.insert("net", 1, 10).unwrap_err();
        assert!(matches!(err, OverlayError::Persistence { .. }));
        assert!(table.get("net").is_ok());
    }
}
