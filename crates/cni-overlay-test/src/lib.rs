//! Test infrastructure for the CNI overlay agent
//!
//! Provides:
//! - A recording [`CommandRunner`](cni_overlay_common::CommandRunner) with
//!   failure injection and canned responses
//! - Topology snapshot fixtures as the manager would serve them
//! - Flow-rule and command verification helpers

pub mod fixtures;
mod recorder;
mod verification;

pub use fixtures::*;
pub use recorder::RecordingRunner;
pub use verification::*;
