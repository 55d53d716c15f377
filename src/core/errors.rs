/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for blocking gate and latch operations
pub type GateResult<T> = Result<T, GateError>;

/// Errors surfaced by a blocking wait
///
/// `open`/`close` and waits on an open gate cannot fail; the only failure is
/// a wait given up through its cancel token.
#[derive(Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum GateError {
    #[error("Wait was cancelled")]
    #[diagnostic(
        code(gate::cancelled),
        help("The cancel token fired before the gate opened. Gate state is unchanged.")
    )]
    Cancelled,
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    #[diagnostic(
        code(config::invalid_value),
        help("Expected a non-negative integer (a positive one for the timeout). Unset the variable to use the default.")
    )]
    InvalidValue { key: &'static str, value: String },
}

/// Caller group in the demonstration harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerGroup {
    /// Waits on the gate immediately
    Early,
    /// Waits on the trigger latch first, then on the gate
    Late,
}

impl std::fmt::Display for CallerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallerGroup::Early => write!(f, "early"),
            CallerGroup::Late => write!(f, "late"),
        }
    }
}

/// Demonstration harness errors
#[derive(Error, Debug, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("{group} callers hung: {completed}/{expected} completed before the timeout")]
    #[diagnostic(
        code(harness::hang),
        help("A waiter present before open(), or one whose token was cancelled, stayed parked. This is a lost wakeup.")
    )]
    Hang {
        group: CallerGroup,
        completed: usize,
        expected: usize,
    },

    #[error("Only {suspended}/{expected} early callers suspended before the timeout")]
    #[diagnostic(
        code(harness::not_suspended),
        help("Early callers must all be blocked on the gate before it opens.")
    )]
    NotSuspended { suspended: usize, expected: usize },

    #[error("{group} caller failed unexpectedly: {source}")]
    #[diagnostic(code(harness::unexpected))]
    Unexpected {
        group: CallerGroup,
        #[source]
        source: GateError,
    },

    #[error("Failed to spawn worker thread: {0}")]
    #[diagnostic(code(harness::spawn_failed))]
    Spawn(#[from] std::io::Error),

    #[error("{0} worker thread(s) panicked")]
    #[diagnostic(code(harness::worker_panicked))]
    WorkerPanicked(usize),

    #[error("Completion channel disconnected with {missing} outcome(s) outstanding")]
    #[diagnostic(code(harness::disconnected))]
    Disconnected { missing: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_gate_error_serializes_tagged() {
        let json = serde_json::to_string(&GateError::Cancelled).unwrap();
        assert_eq!(json, r#"{"error_type":"cancelled"}"#);
    }

    #[test]
    fn test_hang_message() {
        let err = HarnessError::Hang {
            group: CallerGroup::Early,
            completed: 98,
            expected: 100,
        };
        assert_eq!(
            err.to_string(),
            "early callers hung: 98/100 completed before the timeout"
        );
    }
}
