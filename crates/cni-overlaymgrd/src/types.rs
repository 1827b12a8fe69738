//! Overlay type definitions

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tables::{MAX_SYNC_INTERVAL_SECS, TUNNEL_PORT_PREFIX};

/// Peer status reported by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Ready,
    Down,
    #[serde(other)]
    Unknown,
}

/// One cluster agent as listed in a topology snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub ip: String,
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(id: impl Into<String>, ip: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            id: id.into(),
            ip: ip.into(),
            status,
        }
    }
}

/// Authoritative cluster view served by the manager's sync endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Suggested sync interval in seconds, as a number or a numeric string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Value>,
}

impl Topology {
    /// Suggested interval in seconds, if present, parsable and within
    /// `1..=MAX_SYNC_INTERVAL_SECS`
    pub fn interval_secs(&self) -> Option<u64> {
        let secs = match self.interval.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }?;
        (1..=MAX_SYNC_INTERVAL_SECS).contains(&secs).then_some(secs)
    }

    /// Suggested interval, falling back to `default`
    pub fn sync_interval(&self, default: Duration) -> Duration {
        self.interval_secs()
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

/// A tenant network active on this host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunNet {
    pub network_id: String,
    pub vni: u32,
    pub vlan_id: u16,
}

impl TunNet {
    pub fn new(network_id: impl Into<String>, vni: u32, vlan_id: u16) -> Self {
        Self {
            network_id: network_id.into(),
            vni,
            vlan_id,
        }
    }

    /// True if any of the three identifiers is shared with `other`
    pub fn collides_with(&self, other: &TunNet) -> bool {
        self.network_id == other.network_id
            || self.vni == other.vni
            || self.vlan_id == other.vlan_id
    }
}

/// Tunnel state for one peer ever seen on this host
///
/// Records are never removed; a peer going down flips its record to
/// `Unlinked` and a later `ready` re-links the same record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunPort {
    Linked { ofport: u32, agent: Agent },
    Unlinked { agent: Agent },
}

impl TunPort {
    pub fn agent(&self) -> &Agent {
        match self {
            TunPort::Linked { agent, .. } | TunPort::Unlinked { agent } => agent,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.agent().id
    }

    pub fn ofport(&self) -> Option<u32> {
        match self {
            TunPort::Linked { ofport, .. } => Some(*ofport),
            TunPort::Unlinked { .. } => None,
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, TunPort::Linked { .. })
    }

    /// Switch port name while linked
    pub fn port_name(&self) -> Option<String> {
        self.ofport().map(tunnel_port_name)
    }
}

/// Name of the VXLAN port holding `ofport`
pub fn tunnel_port_name(ofport: u32) -> String {
    format!("{}{}", TUNNEL_PORT_PREFIX, ofport)
}

/// Parameters of one VXLAN tunnel port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VxlanPort {
    pub name: String,
    pub ofport: u32,
    pub remote_ip: String,
    pub local_ip: String,
    pub dst_port: u16,
}

/// Persisted tenant network record
///
/// Field names on disk are `VNI`, `VlanID` and `PodIDs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantNetworkValue {
    #[serde(rename = "VNI")]
    pub vni: u32,
    #[serde(rename = "VlanID")]
    pub vlan_id: String,
    #[serde(rename = "PodIDs", default)]
    pub pod_ids: BTreeSet<String>,
}

impl TenantNetworkValue {
    pub fn new(vni: u32, vlan_id: impl Into<String>) -> Self {
        Self {
            vni,
            vlan_id: vlan_id.into(),
            pod_ids: BTreeSet::new(),
        }
    }

    /// VLAN id as a number, if the stored string is valid
    pub fn vlan(&self) -> Option<u16> {
        self.vlan_id.parse().ok()
    }
}

/// Pod reference key, `"namespace:name"`
pub fn pod_key(namespace: &str, name: &str) -> String {
    format!("{}:{}", namespace, name)
}
