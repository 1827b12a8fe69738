//! Test fixtures for topology snapshots and tenant networks
//!
//! Topology fixtures render the JSON document the central manager serves
//! from its sync endpoint, so tests exercise the same decoding path as the
//! agent.

use serde_json::{json, Value};

/// Peer status as reported by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Ready,
    Down,
}

impl PeerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerStatus::Ready => "ready",
            PeerStatus::Down => "down",
        }
    }
}

/// One agent entry of a topology snapshot
#[derive(Debug, Clone)]
pub struct AgentFixture {
    pub id: String,
    pub ip: String,
    pub status: PeerStatus,
}

impl AgentFixture {
    /// Agent reported ready
    pub fn ready(id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip: ip.into(),
            status: PeerStatus::Ready,
        }
    }

    /// Agent reported down
    pub fn down(id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip: ip.into(),
            status: PeerStatus::Down,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "ip": self.ip,
            "status": self.status.as_str(),
        })
    }
}

/// Builder for a manager sync response
#[derive(Debug, Clone, Default)]
pub struct TopologyFixture {
    pub agents: Vec<AgentFixture>,
    pub interval: Option<Value>,
}

impl TopologyFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent entry
    pub fn with_agent(mut self, agent: AgentFixture) -> Self {
        self.agents.push(agent);
        self
    }

    /// Suggest a sync interval as a JSON number
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval = Some(json!(secs));
        self
    }

    /// Suggest a sync interval as a JSON string (the manager sends either)
    pub fn with_interval_str(mut self, secs: &str) -> Self {
        self.interval = Some(json!(secs));
        self
    }

    pub fn to_json(&self) -> Value {
        let agents: Vec<Value> = self.agents.iter().map(AgentFixture::to_json).collect();
        match &self.interval {
            Some(interval) => json!({ "agents": agents, "interval": interval }),
            None => json!({ "agents": agents }),
        }
    }

    pub fn to_body(&self) -> String {
        self.to_json().to_string()
    }
}

/// Common topology scenarios
pub mod topology_fixtures {
    use super::*;

    /// Local agent address used by the scenarios
    pub const SELF_IP: &str = "192.168.10.1";

    /// The local agent plus `peers` ready peers at 192.168.10.2..
    pub fn ready_mesh(peers: usize) -> TopologyFixture {
        let mut topo = TopologyFixture::new().with_agent(AgentFixture::ready("node-1", SELF_IP));
        for i in 0..peers {
            topo = topo.with_agent(AgentFixture::ready(
                format!("node-{}", i + 2),
                format!("192.168.10.{}", i + 2),
            ));
        }
        topo
    }

    /// The local agent and one peer with the given status
    pub fn single_peer(status: PeerStatus) -> TopologyFixture {
        let peer = match status {
            PeerStatus::Ready => AgentFixture::ready("node-2", "192.168.10.2"),
            PeerStatus::Down => AgentFixture::down("node-2", "192.168.10.2"),
        };
        TopologyFixture::new()
            .with_agent(AgentFixture::ready("node-1", SELF_IP))
            .with_agent(peer)
    }
}

/// Tenant network triple (network id, VNI, VLAN id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFixture {
    pub network_id: String,
    pub vni: u32,
    pub vlan_id: u16,
}

/// Common tenant network fixtures
pub mod network_fixtures {
    use super::*;

    /// Network `n` with disjoint id, VNI (1000 + n) and VLAN (100 + n)
    pub fn tenant(n: u16) -> NetworkFixture {
        NetworkFixture {
            network_id: format!("net-{}", n),
            vni: 1000 + u32::from(n),
            vlan_id: 100 + n,
        }
    }

    /// `count` networks with pairwise disjoint triples
    pub fn tenants(count: u16) -> Vec<NetworkFixture> {
        (1..=count).map(tenant).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_fixture_json() {
        let agent = AgentFixture::down("node-3", "10.0.0.3");
        assert_eq!(
            agent.to_json(),
            json!({"id": "node-3", "ip": "10.0.0.3", "status": "down"})
        );
    }

    #[test]
    fn test_topology_interval_forms() {
        let numeric = TopologyFixture::new().with_interval_secs(15).to_json();
        assert_eq!(numeric["interval"], json!(15));

        let text = TopologyFixture::new().with_interval_str("20").to_json();
        assert_eq!(text["interval"], json!("20"));

        let none = TopologyFixture::new().to_json();
        assert!(none.get("interval").is_none());
    }

    #[test]
    fn test_ready_mesh() {
        let topo = topology_fixtures::ready_mesh(3);
        assert_eq!(topo.agents.len(), 4);
        assert_eq!(topo.agents[0].ip, topology_fixtures::SELF_IP);
        assert_eq!(topo.agents[3].ip, "192.168.10.4");
    }

    #[test]
    fn test_tenants_disjoint() {
        let nets = network_fixtures::tenants(3);
        assert_eq!(nets.len(), 3);
        assert_eq!(nets[0].vni, 1001);
        assert_eq!(nets[2].vlan_id, 103);
    }
}
