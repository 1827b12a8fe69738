//! Verification helpers for testing switch programming
//!
//! Provides assertion helpers over recorded commands and the flow rules
//! they install.

use std::collections::BTreeSet;
use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected command containing '{expected}' not executed; saw {actual:?}")]
    CommandMissing {
        expected: String,
        actual: Vec<String>,
    },

    #[error("Unexpected command containing '{pattern}' executed")]
    UnexpectedCommand { pattern: String },

    #[error("Expected {expected} items matching '{pattern}', found {actual}")]
    CountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },

    #[error("Expected flow containing '{expected}' not installed")]
    FlowMissing { expected: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Command execution verifier
pub struct CommandVerifier {
    captured_commands: Vec<String>,
}

impl CommandVerifier {
    /// Create a new command verifier
    pub fn new(captured_commands: Vec<String>) -> Self {
        Self { captured_commands }
    }

    /// Verify that a command containing `expected` was executed
    pub fn assert_command_executed(&self, expected: &str) -> VerifyResult<()> {
        if self.captured_commands.iter().any(|cmd| cmd.contains(expected)) {
            Ok(())
        } else {
            Err(VerificationError::CommandMissing {
                expected: expected.to_string(),
                actual: self.captured_commands.clone(),
            })
        }
    }

    /// Verify that no command containing `pattern` was executed
    pub fn assert_command_not_executed(&self, pattern: &str) -> VerifyResult<()> {
        if self.captured_commands.iter().any(|cmd| cmd.contains(pattern)) {
            Err(VerificationError::UnexpectedCommand {
                pattern: pattern.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Verify how many commands contain `pattern`
    pub fn assert_command_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let actual = self
            .captured_commands
            .iter()
            .filter(|cmd| cmd.contains(pattern))
            .count();
        if actual != expected {
            Err(VerificationError::CountMismatch {
                pattern: pattern.to_string(),
                expected,
                actual,
            })
        } else {
            Ok(())
        }
    }

    /// Get all captured commands
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }
}

/// Flow rule verifier
///
/// Extracts the flow spec (last quoted argument) from every `add-flow`
/// command so installed rule sets can be compared independent of issue order.
pub struct FlowVerifier {
    flows: Vec<String>,
}

impl FlowVerifier {
    /// Build from recorded commands
    pub fn from_commands(commands: &[String]) -> Self {
        let flows = commands
            .iter()
            .filter(|cmd| cmd.contains(" add-flow "))
            .filter_map(|cmd| last_quoted(cmd))
            .collect();
        Self { flows }
    }

    /// Installed flow specs in issue order
    pub fn flows(&self) -> &[String] {
        &self.flows
    }

    /// Installed flow specs as an order-independent set
    pub fn flow_set(&self) -> BTreeSet<String> {
        self.flows.iter().cloned().collect()
    }

    /// Flow specs installed into `table`
    pub fn flows_in_table(&self, table: u8) -> Vec<&str> {
        let prefix = format!("table={},", table);
        self.flows
            .iter()
            .filter(|f| f.starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }

    /// Verify that some installed flow contains `expected`
    pub fn assert_flow(&self, expected: &str) -> VerifyResult<()> {
        if self.flows.iter().any(|f| f.contains(expected)) {
            Ok(())
        } else {
            Err(VerificationError::FlowMissing {
                expected: expected.to_string(),
            })
        }
    }

    /// Verify how many flows were installed into `table`
    pub fn assert_table_count(&self, table: u8, expected: usize) -> VerifyResult<()> {
        let actual = self.flows_in_table(table).len();
        if actual != expected {
            Err(VerificationError::CountMismatch {
                pattern: format!("table={}", table),
                expected,
                actual,
            })
        } else {
            Ok(())
        }
    }
}

/// Returns the contents of the last double-quoted segment of `cmd`
fn last_quoted(cmd: &str) -> Option<String> {
    let end = cmd.rfind('"')?;
    let start = cmd[..end].rfind('"')?;
    Some(cmd[start + 1..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_verifier() {
        let commands = vec![
            "ovs-vsctl --may-exist add-br \"br-tun\"".to_string(),
            "ovs-ofctl del-flows \"br-tun\"".to_string(),
        ];

        let verifier = CommandVerifier::new(commands);

        assert!(verifier.assert_command_executed("add-br").is_ok());
        assert!(verifier.assert_command_not_executed("add-port").is_ok());
        assert!(verifier.assert_command_count("br-tun", 2).is_ok());
        assert!(verifier.assert_command_count("br-tun", 3).is_err());
        assert!(verifier.assert_command_executed("del-port").is_err());
    }

    #[test]
    fn test_flow_verifier() {
        let commands = vec![
            "ovs-ofctl add-flow \"br-tun\" \"table=0,priority=1,actions=resubmit(,4)\"".to_string(),
            "ovs-ofctl del-flows \"br-tun\" \"table=4\"".to_string(),
            "ovs-ofctl add-flow \"br-tun\" \"table=4,priority=0,actions=drop\"".to_string(),
        ];

        let verifier = FlowVerifier::from_commands(&commands);
        assert_eq!(verifier.flows().len(), 2);
        assert!(verifier.assert_flow("resubmit(,4)").is_ok());
        assert!(verifier.assert_table_count(4, 1).is_ok());
        assert!(verifier.assert_table_count(21, 0).is_ok());
        assert!(verifier.assert_flow("table=21").is_err());
    }
}
