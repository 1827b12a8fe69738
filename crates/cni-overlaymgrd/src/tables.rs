//! Table, bridge and port name constants for overlaymgrd

// Persisted tables (one JSON file each under the state directory)
pub const TENANT_NETWORK_TABLE: &str = "tenant_networks";

// Bridges
pub const TUNNEL_BRIDGE: &str = "br-tun";
pub const INTEGRATION_BRIDGE: &str = "br-int";

// Patch pair wiring br-tun <-> br-int
pub const PATCH_INT_PORT: &str = "patch-int";
pub const PATCH_TUN_PORT: &str = "patch-tun";
/// ofport of `patch-int` on the tunnel bridge
pub const PATCH_INT_OFPORT: u32 = 1;

/// VXLAN tunnel ports are named `vxlan-<ofport>`
pub const TUNNEL_PORT_PREFIX: &str = "vxlan-";

/// UDP destination port for VXLAN tunnels (not the IANA 4789)
pub const VXLAN_DST_PORT: u16 = 6789;

/// Exclusive upper bound of usable 802.1Q VLAN ids
pub const VLAN_ID_LIMIT: u32 = 4095;

/// Exclusive upper bound of OpenFlow physical port numbers
pub const OFPORT_LIMIT: u32 = 0xff00;

/// OpenFlow tables on the tunnel bridge
pub mod flow_tables {
    /// Classifies by ingress port
    pub const CLASSIFY: u8 = 0;
    /// Traffic from the integration bridge
    pub const FROM_PATCH: u8 = 1;
    /// Tunnel decap: tunnel key -> local VLAN
    pub const TUN_TO_VLAN: u8 = 4;
    /// MAC learning from tunnel traffic
    pub const LEARN_FROM_TUN: u8 = 10;
    /// Learned unicast destinations
    pub const UCAST_TO_TUN: u8 = 20;
    /// Encap and flood: local VLAN -> tunnel key
    pub const FLOOD_TO_TUN: u8 = 21;
}

/// Largest heartbeat interval accepted from the manager or config, seconds
pub const MAX_SYNC_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Hard timeout of learned unicast entries, seconds
pub const LEARN_HARD_TIMEOUT_SECS: u32 = 300;
