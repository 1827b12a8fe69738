//! Flow table programming for the tunnel bridge
//!
//! The tunnel bridge pipeline:
//!
//! ```text
//! table 0  classify   patch port -> 1, anything else (tunnels) -> 4
//! table 1  from patch unicast -> 20, multicast/broadcast -> 21, else drop
//! table 4  decap      tun_id=V -> mod_vlan_vid:L, resubmit(,10)   [per network]
//! table 10 learn      learn unicast entry into 20, output to patch port
//! table 20 unicast    learned entries, miss -> 21
//! table 21 flood      dl_vlan=L -> strip, set_tunnel:V, flood     [per network]
//! ```
//!
//! Tables 4 and 21 are rebuilt from scratch on every [`FlowProgrammer::update`];
//! the others only hold the fixed base rules.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cni_overlay_common::{CommandRunner, OverlayResult};
use tracing::{debug, info, instrument, warn};

use crate::commands::{
    build_add_bridge_cmd, build_add_flow_cmd, build_add_patch_port_cmd, build_del_flows_cmd,
};
use crate::config::SwitchConfig;
use crate::tables::{
    flow_tables, LEARN_HARD_TIMEOUT_SECS, PATCH_INT_OFPORT, PATCH_INT_PORT, PATCH_TUN_PORT,
};
use crate::types::{TunNet, TunPort};

/// One OpenFlow match-action rule
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowRule {
    pub table: u8,
    pub priority: u16,
    /// Comma-separated match fields; empty matches everything
    pub matches: String,
    pub actions: String,
}

impl FlowRule {
    pub fn new(
        table: u8,
        priority: u16,
        matches: impl Into<String>,
        actions: impl Into<String>,
    ) -> Self {
        Self {
            table,
            priority,
            matches: matches.into(),
            actions: actions.into(),
        }
    }

    /// `ovs-ofctl` flow syntax
    pub fn spec(&self) -> String {
        if self.matches.is_empty() {
            format!(
                "table={},priority={},actions={}",
                self.table, self.priority, self.actions
            )
        } else {
            format!(
                "table={},priority={},{},actions={}",
                self.table, self.priority, self.matches, self.actions
            )
        }
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec())
    }
}

/// Fixed rules present regardless of networks and peers
pub fn base_rules() -> Vec<FlowRule> {
    use flow_tables::*;

    let learn = format!(
        "learn(table={},hard_timeout={},priority=1,NXM_OF_VLAN_TCI[0..11],\
         NXM_OF_ETH_DST[]=NXM_OF_ETH_SRC[],load:0->NXM_OF_VLAN_TCI[],\
         load:NXM_NX_TUN_ID[]->NXM_NX_TUN_ID[],output:NXM_OF_IN_PORT[]),output:{}",
        UCAST_TO_TUN, LEARN_HARD_TIMEOUT_SECS, PATCH_INT_OFPORT
    );

    vec![
        FlowRule::new(
            CLASSIFY,
            2,
            format!("in_port={}", PATCH_INT_OFPORT),
            format!("resubmit(,{})", FROM_PATCH),
        ),
        FlowRule::new(CLASSIFY, 1, "", format!("resubmit(,{})", TUN_TO_VLAN)),
        FlowRule::new(
            FROM_PATCH,
            1,
            "dl_dst=00:00:00:00:00:00/01:00:00:00:00:00",
            format!("resubmit(,{})", UCAST_TO_TUN),
        ),
        FlowRule::new(
            FROM_PATCH,
            1,
            "dl_dst=01:00:00:00:00:00/01:00:00:00:00:00",
            format!("resubmit(,{})", FLOOD_TO_TUN),
        ),
        FlowRule::new(FROM_PATCH, 0, "", "drop"),
        FlowRule::new(TUN_TO_VLAN, 0, "", "drop"),
        FlowRule::new(LEARN_FROM_TUN, 1, "", learn),
        FlowRule::new(UCAST_TO_TUN, 0, "", format!("resubmit(,{})", FLOOD_TO_TUN)),
        FlowRule::new(FLOOD_TO_TUN, 0, "", "drop"),
    ]
}

/// Decap rule: tunnel key -> local VLAN
pub fn ingress_rule(net: &TunNet) -> FlowRule {
    FlowRule::new(
        flow_tables::TUN_TO_VLAN,
        1,
        format!("tun_id={:#x}", net.vni),
        format!(
            "mod_vlan_vid:{},resubmit(,{})",
            net.vlan_id,
            flow_tables::LEARN_FROM_TUN
        ),
    )
}

/// Encap rule: local VLAN -> tunnel key, flooded to every tunnel in `ofports`
pub fn egress_rule(net: &TunNet, ofports: &[u32]) -> FlowRule {
    let mut actions = format!("strip_vlan,set_tunnel:{:#x}", net.vni);
    for ofport in ofports {
        actions.push_str(&format!(",output:{}", ofport));
    }
    FlowRule::new(
        flow_tables::FLOOD_TO_TUN,
        1,
        format!("dl_vlan={}", net.vlan_id),
        actions,
    )
}

/// Complete rule set for the given networks and ports
pub fn desired_rules(networks: &[TunNet], ports: &[TunPort]) -> Vec<FlowRule> {
    let ofports: Vec<u32> = ports.iter().filter_map(TunPort::ofport).collect();
    let mut rules = base_rules();
    for net in networks {
        rules.push(ingress_rule(net));
        rules.push(egress_rule(net, &ofports));
    }
    rules
}

/// Outcome of one rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub installed: usize,
    pub failed: usize,
}

/// Issues rule commands against the tunnel bridge
pub struct FlowProgrammer {
    runner: Arc<dyn CommandRunner>,
    tunnel_bridge: String,
    integration_bridge: String,
    bridge_retry: Duration,
}

impl FlowProgrammer {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &SwitchConfig) -> Self {
        Self {
            runner,
            tunnel_bridge: config.tunnel_bridge.clone(),
            integration_bridge: config.integration_bridge.clone(),
            bridge_retry: config.bridge_retry(),
        }
    }

    pub fn tunnel_bridge(&self) -> &str {
        &self.tunnel_bridge
    }

    /// Prepare both bridges, the patch pair and the base rules
    ///
    /// Bridge creation is retried until the switch answers.
    #[instrument(skip(self))]
    pub async fn init(&self) -> OverlayResult<()> {
        self.ensure_bridge(&self.tunnel_bridge).await;
        self.ensure_bridge(&self.integration_bridge).await;

        let cmd = build_add_patch_port_cmd(
            &self.tunnel_bridge,
            PATCH_INT_PORT,
            PATCH_TUN_PORT,
            Some(PATCH_INT_OFPORT),
        );
        self.runner.run(&cmd).await?;

        let cmd =
            build_add_patch_port_cmd(&self.integration_bridge, PATCH_TUN_PORT, PATCH_INT_PORT, None);
        self.runner.run(&cmd).await?;

        self.runner
            .run(&build_del_flows_cmd(&self.tunnel_bridge, None))
            .await?;

        let mut summary = UpdateSummary::default();
        for rule in base_rules() {
            self.record(&mut summary, self.add_flow(&rule).await);
        }

        info!(
            bridge = %self.tunnel_bridge,
            installed = summary.installed,
            failed = summary.failed,
            "Tunnel bridge initialized"
        );
        Ok(())
    }

    async fn ensure_bridge(&self, bridge: &str) {
        let cmd = build_add_bridge_cmd(bridge);
        loop {
            match self.runner.run(&cmd).await {
                Ok(_) => return,
                Err(e) => {
                    warn!(
                        bridge,
                        error = %e,
                        retry_in = ?self.bridge_retry,
                        "Switch not reachable, retrying bridge creation"
                    );
                    tokio::time::sleep(self.bridge_retry).await;
                }
            }
        }
    }

    /// Rebuild the variable tables from `networks` and `ports`
    #[instrument(skip(self, networks, ports), fields(networks = networks.len(), ports = ports.len()))]
    pub async fn update(&self, networks: &[TunNet], ports: &[TunPort]) -> UpdateSummary {
        let mut summary = UpdateSummary::default();

        for table in [flow_tables::TUN_TO_VLAN, flow_tables::FLOOD_TO_TUN] {
            let cmd = build_del_flows_cmd(&self.tunnel_bridge, Some(table));
            if let Err(e) = self.runner.run(&cmd).await {
                warn!(table, error = %e, "Failed to clear flow table");
            }
        }

        for rule in desired_rules(networks, ports) {
            self.record(&mut summary, self.add_flow(&rule).await);
        }

        if summary.failed > 0 {
            warn!(
                installed = summary.installed,
                failed = summary.failed,
                "Flow rebuild incomplete"
            );
        } else {
            debug!(installed = summary.installed, "Flow rebuild complete");
        }
        summary
    }

    async fn add_flow(&self, rule: &FlowRule) -> bool {
        let cmd = build_add_flow_cmd(&self.tunnel_bridge, rule);
        match self.runner.run(&cmd).await {
            Ok(_) => true,
            Err(e) => {
                warn!(flow = %rule, error = %e, "Failed to install flow");
                false
            }
        }
    }

    fn record(&self, summary: &mut UpdateSummary, installed: bool) {
        if installed {
            summary.installed += 1;
        } else {
            summary.failed += 1;
        }
    }
}
