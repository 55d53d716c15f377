/*!
 * Epoch Gate Library
 * Generation-tracked gate synchronizer and its demonstration harness
 */

pub mod core;
pub mod harness;
pub mod monitoring;

// Re-exports
pub use crate::core::errors::{CallerGroup, ConfigError, GateError, GateResult, HarnessError};
pub use crate::core::sync::{AsyncGate, CancelToken, CountDownLatch, Gate, GateSnapshot};
pub use harness::{DemoConfig, DemoReport};
pub use monitoring::init_tracing;
