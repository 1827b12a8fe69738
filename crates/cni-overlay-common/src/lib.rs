//! Common infrastructure for the CNI overlay agent.
//!
//! - [`shell`]: Safe shell command execution and the [`CommandRunner`] seam
//! - [`store`]: Node-local JSON table persistence
//! - [`error`]: Error types shared by all overlay components
//!
//! # Example
//!
//! ```ignore
//! use cni_overlay_common::{
//!     shell::{self, OVS_OFCTL_CMD, shellquote},
//!     OverlayResult,
//! };
//!
//! async fn clear_flows(bridge: &str) -> OverlayResult<()> {
//!     let cmd = format!("{} del-flows {}", OVS_OFCTL_CMD, shellquote(bridge));
//!     shell::exec_or_throw(&cmd).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod shell;
pub mod store;

// Re-export commonly used items at crate root
pub use error::{OverlayError, OverlayResult};
pub use shell::{CommandRunner, ShellRunner};
pub use store::TableStore;
