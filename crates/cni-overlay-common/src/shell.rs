//! Shell command execution for switch programming.
//!
//! All switch state is driven through the Open vSwitch CLI tools. Commands
//! are built as strings with every interpolated value passed through
//! [`shellquote`], then executed via `/bin/sh -c`.
//!
//! Components never call [`exec`] directly; they hold a [`CommandRunner`]
//! so tests can substitute a recorder for the real shell.
//!
//! # Example
//!
//! ```ignore
//! use cni_overlay_common::shell::{self, OVS_VSCTL_CMD, shellquote};
//!
//! let cmd = format!("{} --may-exist add-br {}", OVS_VSCTL_CMD, shellquote("br-tun"));
//! let result = shell::exec(&cmd).await?;
//! ```

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::error::{OverlayError, OverlayResult};

/// Path to `ovs-vsctl` for bridge and port configuration.
pub const OVS_VSCTL_CMD: &str = "/usr/bin/ovs-vsctl";

/// Path to `ovs-ofctl` for OpenFlow rule management.
pub const OVS_OFCTL_CMD: &str = "/usr/bin/ovs-ofctl";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\`
/// and newline.
///
/// ```
/// use cni_overlay_common::shell::shellquote;
///
/// assert_eq!(shellquote("br-tun"), "\"br-tun\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The stdout output.
    pub stdout: String,
    /// The stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command asynchronously.
///
/// Returns `Err` only when the command could not be spawned; a non-zero
/// exit is reported through [`ExecResult::exit_code`].
pub async fn exec(cmd: &str) -> OverlayResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| OverlayError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> OverlayResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(OverlayError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

/// Executes switch commands on behalf of a component.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `cmd`, returning stdout on success.
    async fn run(&self, cmd: &str) -> OverlayResult<String>;
}

/// Runs commands through the real shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, cmd: &str) -> OverlayResult<String> {
        exec_or_throw(cmd).await
    }
}

/// Runs `cmd` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the last error once attempts are exhausted.
pub async fn run_with_retry(
    runner: &dyn CommandRunner,
    cmd: &str,
    attempts: u32,
    delay: Duration,
) -> OverlayResult<String> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match runner.run(cmd).await {
            Ok(out) => return Ok(out),
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    command = %cmd,
                    attempt,
                    attempts,
                    error = %e,
                    "Command failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
