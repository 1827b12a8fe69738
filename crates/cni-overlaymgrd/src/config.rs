//! Configuration file support for overlaymgrd
//!
//! Loads and validates agent configuration from a TOML file.
//! Default location: /etc/cni-overlay/overlaymgrd.toml

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use cni_overlay_common::store::DEFAULT_STATE_DIR;
use cni_overlay_common::{OverlayError, OverlayResult};
use serde::{Deserialize, Serialize};

use crate::tables::{INTEGRATION_BRIDGE, MAX_SYNC_INTERVAL_SECS, TUNNEL_BRIDGE, VXLAN_DST_PORT};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cni-overlay/overlaymgrd.toml";

/// Central manager (topology source) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base URL, e.g. `http://10.0.0.10:9696`
    #[serde(default = "default_manager_url")]
    pub url: String,

    /// Backoff between failed sync attempts in seconds
    #[serde(default = "default_sync_retry")]
    pub sync_retry_secs: u64,

    /// Heartbeat interval used when the manager suggests none
    #[serde(default = "default_heartbeat_interval")]
    pub default_interval_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Identity of this host in the tunnel mesh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Internal IP the manager knows this agent by
    #[serde(default)]
    pub internal_ip: String,

    /// Local VXLAN endpoint; defaults to `internal_ip`
    #[serde(default)]
    pub tunnel_ip: Option<String>,
}

/// Local switch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(default = "default_tunnel_bridge")]
    pub tunnel_bridge: String,

    #[serde(default = "default_integration_bridge")]
    pub integration_bridge: String,

    /// UDP destination port of VXLAN tunnels
    #[serde(default = "default_vxlan_dst_port")]
    pub vxlan_dst_port: u16,

    /// Delay between bridge creation attempts at startup, milliseconds
    #[serde(default = "default_bridge_retry")]
    pub bridge_retry_ms: u64,

    /// Attempts for each tunnel port add/delete
    #[serde(default = "default_command_attempts")]
    pub command_attempts: u32,

    /// Delay between tunnel port command attempts, milliseconds
    #[serde(default = "default_command_retry_delay")]
    pub command_retry_delay_ms: u64,
}

/// Persisted state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Memory-backed directory holding one JSON file per table
    #[serde(default = "default_state_dir")]
    pub dir: String,
}

/// Complete overlaymgrd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub switch: SwitchConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

// Default functions
fn default_manager_url() -> String {
    "http://127.0.0.1:9696".to_string()
}

fn default_sync_retry() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

fn default_tunnel_bridge() -> String {
    TUNNEL_BRIDGE.to_string()
}

fn default_integration_bridge() -> String {
    INTEGRATION_BRIDGE.to_string()
}

fn default_vxlan_dst_port() -> u16 {
    VXLAN_DST_PORT
}

fn default_bridge_retry() -> u64 {
    3000
}

fn default_command_attempts() -> u32 {
    3
}

fn default_command_retry_delay() -> u64 {
    500
}

fn default_state_dir() -> String {
    DEFAULT_STATE_DIR.to_string()
}

// Default implementations
impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            url: default_manager_url(),
            sync_retry_secs: default_sync_retry(),
            default_interval_secs: default_heartbeat_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            tunnel_bridge: default_tunnel_bridge(),
            integration_bridge: default_integration_bridge(),
            vxlan_dst_port: default_vxlan_dst_port(),
            bridge_retry_ms: default_bridge_retry(),
            command_attempts: default_command_attempts(),
            command_retry_delay_ms: default_command_retry_delay(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

impl ManagerConfig {
    pub fn sync_retry(&self) -> Duration {
        Duration::from_secs(self.sync_retry_secs)
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SwitchConfig {
    pub fn bridge_retry(&self) -> Duration {
        Duration::from_millis(self.bridge_retry_ms)
    }

    pub fn command_retry_delay(&self) -> Duration {
        Duration::from_millis(self.command_retry_delay_ms)
    }
}

impl OverlayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> OverlayResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            OverlayError::invalid_config(
                "config_file",
                format!("Failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> OverlayResult<Self> {
        let config: OverlayConfig = toml::from_str(contents)
            .map_err(|e| OverlayError::invalid_config("config_file", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> OverlayResult<()> {
        if !self.manager.url.starts_with("http://") && !self.manager.url.starts_with("https://") {
            return Err(OverlayError::invalid_config(
                "manager.url",
                format!("Expected an http(s) URL, got '{}'", self.manager.url),
            ));
        }

        if !(1..=MAX_SYNC_INTERVAL_SECS).contains(&self.manager.default_interval_secs) {
            return Err(OverlayError::invalid_config(
                "manager.default_interval_secs",
                format!("Must be between 1 and {}", MAX_SYNC_INTERVAL_SECS),
            ));
        }

        if self.manager.sync_retry_secs == 0 {
            return Err(OverlayError::invalid_config(
                "manager.sync_retry_secs",
                "Must be greater than 0",
            ));
        }

        if self.manager.request_timeout_secs == 0 {
            return Err(OverlayError::invalid_config(
                "manager.request_timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.agent.internal_ip.parse::<IpAddr>().is_err() {
            return Err(OverlayError::invalid_config(
                "agent.internal_ip",
                format!("Invalid IP address '{}'", self.agent.internal_ip),
            ));
        }

        if let Some(tunnel_ip) = &self.agent.tunnel_ip {
            if tunnel_ip.parse::<IpAddr>().is_err() {
                return Err(OverlayError::invalid_config(
                    "agent.tunnel_ip",
                    format!("Invalid IP address '{}'", tunnel_ip),
                ));
            }
        }

        if self.switch.tunnel_bridge.is_empty() || self.switch.integration_bridge.is_empty() {
            return Err(OverlayError::invalid_config(
                "switch",
                "Bridge names must not be empty",
            ));
        }

        if self.switch.tunnel_bridge == self.switch.integration_bridge {
            return Err(OverlayError::invalid_config(
                "switch",
                "Tunnel and integration bridges must differ",
            ));
        }

        if self.switch.command_attempts == 0 {
            return Err(OverlayError::invalid_config(
                "switch.command_attempts",
                "Must be at least 1",
            ));
        }

        if self.store.dir.is_empty() {
            return Err(OverlayError::invalid_config("store.dir", "Must not be empty"));
        }

        Ok(())
    }

    /// Local VXLAN endpoint address
    pub fn local_tunnel_ip(&self) -> &str {
        self.agent
            .tunnel_ip
            .as_deref()
            .unwrap_or(&self.agent.internal_ip)
    }
}
