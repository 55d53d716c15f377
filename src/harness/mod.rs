/*!
 * Demonstration Harness
 * Drives one gate with many concurrent callers and reports who got through
 */

mod config;
mod runner;

pub use config::{
    DemoConfig, ENV_CLOSE_DELAY_US, ENV_EARLY_CALLERS, ENV_LATE_CALLERS, ENV_TIMEOUT_MS,
};
pub use runner::{run, DemoReport};
