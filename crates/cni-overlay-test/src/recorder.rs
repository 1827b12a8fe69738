//! Recording command runner
//!
//! Captures every command instead of executing it. Commands matching a
//! registered failure pattern return `ShellCommandFailed`; commands matching
//! a registered response pattern return canned stdout.

use async_trait::async_trait;
use cni_overlay_common::{CommandRunner, OverlayError, OverlayResult};
use parking_lot::Mutex;

#[derive(Debug)]
struct FailureRule {
    pattern: String,
    /// Remaining failures; `None` fails forever.
    remaining: Option<u32>,
}

/// Command runner that records instead of executing.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    failures: Mutex<Vec<FailureRule>>,
    responses: Mutex<Vec<(String, String)>>,
}

impl RecordingRunner {
    /// Create an empty recorder where every command succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command containing `pattern`
    pub fn fail_matching(&self, pattern: impl Into<String>) {
        self.failures.lock().push(FailureRule {
            pattern: pattern.into(),
            remaining: None,
        });
    }

    /// Fail the next `times` commands containing `pattern`
    pub fn fail_matching_times(&self, pattern: impl Into<String>, times: u32) {
        self.failures.lock().push(FailureRule {
            pattern: pattern.into(),
            remaining: Some(times),
        });
    }

    /// Drop all failure rules
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Return `stdout` for commands containing `pattern`
    pub fn respond(&self, pattern: impl Into<String>, stdout: impl Into<String>) {
        self.responses.lock().push((pattern.into(), stdout.into()));
    }

    /// All commands seen so far, including failed ones
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Commands containing `pattern`
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.contains(pattern))
            .cloned()
            .collect()
    }

    /// Return and forget the recorded commands
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.commands.lock())
    }

    fn should_fail(&self, cmd: &str) -> bool {
        let mut failures = self.failures.lock();
        for rule in failures.iter_mut() {
            if !cmd.contains(&rule.pattern) {
                continue;
            }
            match rule.remaining {
                None => return true,
                Some(0) => continue,
                Some(n) => {
                    rule.remaining = Some(n - 1);
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &str) -> OverlayResult<String> {
        self.commands.lock().push(cmd.to_string());

        if self.should_fail(cmd) {
            return Err(OverlayError::ShellCommandFailed {
                command: cmd.to_string(),
                exit_code: 1,
                output: "injected failure".to_string(),
            });
        }

        let responses = self.responses.lock();
        Ok(responses
            .iter()
            .find(|(pattern, _)| cmd.contains(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }
}
