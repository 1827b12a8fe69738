//! Shell command builders for Open vSwitch operations

use cni_overlay_common::shell::{self, shellquote};

use crate::flows::FlowRule;
use crate::types::VxlanPort;

/// Seconds `ovs-vsctl` waits for the database before giving up
pub const VSCTL_TIMEOUT_SECS: u32 = 10;

fn vsctl() -> String {
    format!("{} --timeout={}", shell::OVS_VSCTL_CMD, VSCTL_TIMEOUT_SECS)
}

/// Build bridge creation command (no-op if it exists)
pub fn build_add_bridge_cmd(bridge: &str) -> String {
    format!("{} --may-exist add-br {}", vsctl(), shellquote(bridge))
}

/// Build patch port command
///
/// `ofport` pins the OpenFlow port number so flow rules can refer to it.
pub fn build_add_patch_port_cmd(
    bridge: &str,
    port: &str,
    peer: &str,
    ofport: Option<u32>,
) -> String {
    let mut cmd = format!(
        "{} --may-exist add-port {} {} -- set Interface {} type=patch options:peer={}",
        vsctl(),
        shellquote(bridge),
        shellquote(port),
        shellquote(port),
        shellquote(peer)
    );
    if let Some(ofport) = ofport {
        cmd.push_str(&format!(" ofport_request={}", ofport));
    }
    cmd
}

/// Build VXLAN tunnel port command
///
/// Tunnel keys are taken from the flow (`set_tunnel` / `tun_id` match).
pub fn build_add_vxlan_port_cmd(bridge: &str, port: &VxlanPort) -> String {
    format!(
        "{} --may-exist add-port {} {} -- set Interface {} type=vxlan ofport_request={} \
         options:remote_ip={} options:local_ip={} options:in_key=flow options:out_key=flow \
         options:csum=false options:df_default=false options:dst_port={}",
        vsctl(),
        shellquote(bridge),
        shellquote(&port.name),
        shellquote(&port.name),
        port.ofport,
        shellquote(&port.remote_ip),
        shellquote(&port.local_ip),
        port.dst_port
    )
}

/// Build port deletion command (no-op if absent)
pub fn build_del_port_cmd(bridge: &str, port: &str) -> String {
    format!(
        "{} --if-exists del-port {} {}",
        vsctl(),
        shellquote(bridge),
        shellquote(port)
    )
}

/// Build port listing command
pub fn build_list_ports_cmd(bridge: &str) -> String {
    format!("{} list-ports {}", vsctl(), shellquote(bridge))
}

/// Build flow deletion command for one table, or the whole bridge
pub fn build_del_flows_cmd(bridge: &str, table: Option<u8>) -> String {
    match table {
        Some(table) => format!(
            "{} del-flows {} {}",
            shell::OVS_OFCTL_CMD,
            shellquote(bridge),
            shellquote(&format!("table={}", table))
        ),
        None => format!("{} del-flows {}", shell::OVS_OFCTL_CMD, shellquote(bridge)),
    }
}

/// Build flow installation command
pub fn build_add_flow_cmd(bridge: &str, rule: &FlowRule) -> String {
    format!(
        "{} add-flow {} {}",
        shell::OVS_OFCTL_CMD,
        shellquote(bridge),
        shellquote(&rule.spec())
    )
}
