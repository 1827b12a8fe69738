//! Overlay Manager Daemon - VXLAN tunnel mesh and flow programming agent
//!
//! overlaymgrd runs on every host of the cluster, handling:
//! - A full VXLAN mesh to every ready peer reported by the central manager
//! - Tenant network realization (VNI <-> local VLAN) on the tunnel bridge
//! - Flow rule rebuilds whenever networks or tunnels change
//! - Persisted per-host tenant network reference counts

pub mod agent;
pub mod binder;
pub mod commands;
pub mod config;
pub mod flows;
pub mod id_alloc;
pub mod overlay_mgr;
pub mod tables;
pub mod tenant_table;
pub mod topology;
pub mod types;

pub use agent::OverlayAgent;
pub use binder::NetworkBinder;
pub use config::OverlayConfig;
pub use flows::FlowProgrammer;
pub use id_alloc::IdAllocator;
pub use overlay_mgr::{OverlayMgr, SharedOverlayMgr, SyncSummary, TunnelSettings};
pub use tenant_table::TenantNetworkTable;
pub use topology::TopologyClient;
pub use types::{Agent, AgentStatus, Topology, TunNet, TunPort};
