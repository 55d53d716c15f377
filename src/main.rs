/*!
 * Gate Demo - Main Entry Point
 *
 * Runs the early/late caller scenario against one gate and prints who got
 * through.
 *
 * Environment variables:
 * - GATE_DEMO_A_CALLERS / GATE_DEMO_B_CALLERS: caller counts (default: 100 each)
 * - GATE_DEMO_CLOSE_DELAY_US: race window before closing (default: 10)
 * - GATE_DEMO_TIMEOUT_MS: hang detection bound (default: 5000)
 * - GATE_DEMO_JSON: print the report as JSON (default: false)
 */

use epoch_gate::{harness, init_tracing, DemoConfig};
use miette::{IntoDiagnostic, Result};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let config = DemoConfig::from_env()?;
    info!(?config, "Loaded demo configuration");

    let report = harness::run(&config)?;

    let as_json = std::env::var("GATE_DEMO_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else {
        println!("{report}");
    }

    Ok(())
}
