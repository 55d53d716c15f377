/*!
 * Demonstration Harness Runner
 *
 * Drives one gate with many concurrent callers:
 *
 * 1. Early callers wait on the gate straight away.
 * 2. Late callers wait on a trigger latch, then on the gate.
 * 3. Once every early caller is parked: open, fire the trigger, pause for
 *    the race window, close.
 * 4. Every early caller must complete. Late callers race the close and may
 *    or may not get through; the stragglers are released by cancellation.
 *
 * The runner owns the gate, the latch, the token and all counters. Workers
 * get `Arc` handles and report over a channel; all of them are joined.
 */

use super::config::DemoConfig;
use crate::core::errors::{CallerGroup, GateResult, HarnessError};
use crate::core::sync::{CancelToken, CountDownLatch, Gate};
use crate::monitoring::generate_run_id;
use flume::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// Spin iterations before the suspension poll starts yielding
const SPIN_LIMIT: u32 = 64;
/// Yield iterations before the suspension poll starts sleeping
const YIELD_LIMIT: u32 = 256;
const POLL_SLEEP: Duration = Duration::from_micros(50);

/// What one worker observed
#[derive(Debug, Clone, Copy)]
struct Outcome {
    group: CallerGroup,
    result: GateResult<()>,
}

/// Summary of one harness run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoReport {
    pub run_id: String,
    pub early_expected: usize,
    pub early_completed: usize,
    pub late_expected: usize,
    pub late_completed: usize,
    pub late_cancelled: usize,
    /// Gate generation at the end of the run
    pub generation: u64,
}

impl DemoReport {
    /// Every worker either completed or was cancelled
    pub fn is_accounted_for(&self) -> bool {
        self.early_completed == self.early_expected
            && self.late_completed + self.late_cancelled == self.late_expected
    }
}

impl std::fmt::Display for DemoReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "early callers completed: {}/{}",
            self.early_completed, self.early_expected
        )?;
        writeln!(
            f,
            "late callers completed:  {}/{} ({} cancelled)",
            self.late_completed, self.late_expected, self.late_cancelled
        )?;
        write!(f, "final generation:        {}", self.generation)
    }
}

#[derive(Debug, Default)]
struct Tally {
    early_completed: usize,
    late_completed: usize,
    late_cancelled: usize,
}

impl Tally {
    fn record(&mut self, outcome: Outcome) -> Result<(), HarnessError> {
        match (outcome.group, outcome.result) {
            (CallerGroup::Early, Ok(())) => self.early_completed += 1,
            (CallerGroup::Late, Ok(())) => self.late_completed += 1,
            (CallerGroup::Late, Err(_)) => self.late_cancelled += 1,
            // Early callers are all released by open() before anything is cancelled
            (group @ CallerGroup::Early, Err(source)) => {
                return Err(HarnessError::Unexpected { group, source })
            }
        }
        Ok(())
    }

    fn received(&self) -> usize {
        self.early_completed + self.late_completed + self.late_cancelled
    }
}

/// Run the scenario described by `config`
pub fn run(config: &DemoConfig) -> Result<DemoReport, HarnessError> {
    run_on(config, &Arc::new(Gate::new(false)))
}

/// Run the scenario against `gate`, which must start closed
///
/// Every worker is joined before this returns, on success and on error.
fn run_on(config: &DemoConfig, gate: &Arc<Gate>) -> Result<DemoReport, HarnessError> {
    let run_id = generate_run_id();
    let span = info_span!("gate_demo", run_id = %run_id);
    let _enter = span.enter();

    info!(
        early = config.early_callers,
        late = config.late_callers,
        close_delay_us = config.close_delay.as_micros() as u64,
        "Starting gate demonstration"
    );

    let trigger = Arc::new(CountDownLatch::new(1));
    let token = CancelToken::new();
    let (tx, rx) = flume::unbounded();
    let mut handles = Vec::with_capacity(config.total_callers());

    let result = spawn_callers(config, gate, &trigger, &token, tx, &mut handles)
        .and_then(|()| collect(config, gate, &trigger, &token, &rx));

    // Whatever happened, nobody may stay parked
    token.cancel();
    let panicked = join_all(handles);

    let tally = match result {
        Ok(_) | Err(HarnessError::Disconnected { .. }) if panicked > 0 => {
            return Err(HarnessError::WorkerPanicked(panicked))
        }
        Ok(tally) => tally,
        Err(e) => {
            warn!(error = %e, "Gate demonstration failed; all workers joined");
            return Err(e);
        }
    };

    let report = DemoReport {
        run_id,
        early_expected: config.early_callers,
        early_completed: tally.early_completed,
        late_expected: config.late_callers,
        late_completed: tally.late_completed,
        late_cancelled: tally.late_cancelled,
        generation: gate.generation(),
    };

    info!(
        early_completed = report.early_completed,
        late_completed = report.late_completed,
        late_cancelled = report.late_cancelled,
        generation = report.generation,
        "Gate demonstration finished"
    );
    Ok(report)
}

fn spawn_callers(
    config: &DemoConfig,
    gate: &Arc<Gate>,
    trigger: &Arc<CountDownLatch>,
    token: &CancelToken,
    tx: Sender<Outcome>,
    handles: &mut Vec<JoinHandle<()>>,
) -> Result<(), HarnessError> {
    for i in 0..config.early_callers {
        let gate = Arc::clone(gate);
        let token = token.clone();
        let tx = tx.clone();
        handles.push(
            thread::Builder::new()
                .name(format!("early-{i}"))
                .spawn(move || {
                    let result = gate.wait_cancellable(&token);
                    let _ = tx.send(Outcome {
                        group: CallerGroup::Early,
                        result,
                    });
                })?,
        );
    }

    for i in 0..config.late_callers {
        let gate = Arc::clone(gate);
        let trigger = Arc::clone(trigger);
        let token = token.clone();
        let tx = tx.clone();
        handles.push(
            thread::Builder::new()
                .name(format!("late-{i}"))
                .spawn(move || {
                    let result = trigger
                        .wait_cancellable(&token)
                        .and_then(|()| gate.wait_cancellable(&token));
                    let _ = tx.send(Outcome {
                        group: CallerGroup::Late,
                        result,
                    });
                })?,
        );
    }

    Ok(())
}

/// Collect every early caller, then cancel and collect the stragglers
fn collect(
    config: &DemoConfig,
    gate: &Gate,
    trigger: &CountDownLatch,
    token: &CancelToken,
    rx: &Receiver<Outcome>,
) -> Result<Tally, HarnessError> {
    let mut tally = drive(config, gate, trigger, token, rx)?;
    token.cancel();

    let outstanding = config.total_callers() - tally.received();
    let deadline = Instant::now() + config.completion_timeout;
    while tally.received() < config.total_callers() {
        match rx.recv_deadline(deadline) {
            Ok(outcome) => tally.record(outcome)?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(HarnessError::Hang {
                    group: CallerGroup::Late,
                    completed: tally.late_completed + tally.late_cancelled,
                    expected: config.late_callers,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(HarnessError::Disconnected {
                    missing: config.total_callers() - tally.received(),
                })
            }
        }
    }
    debug!(outstanding, "Stragglers collected");

    Ok(tally)
}

/// Pulse the gate and collect every early caller
fn drive(
    config: &DemoConfig,
    gate: &Gate,
    trigger: &CountDownLatch,
    token: &CancelToken,
    rx: &Receiver<Outcome>,
) -> Result<Tally, HarnessError> {
    await_suspended(gate, config.early_callers, config.completion_timeout)?;

    gate.open();
    trigger.count_down();
    spin_for(config.close_delay);
    gate.close();

    let mut tally = Tally::default();
    let deadline = Instant::now() + config.completion_timeout;
    while tally.early_completed < config.early_callers {
        match rx.recv_deadline(deadline) {
            Ok(outcome) => tally.record(outcome)?,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    completed = tally.early_completed,
                    cancelled = token.is_cancelled(),
                    "Early callers did not all complete"
                );
                return Err(HarnessError::Hang {
                    group: CallerGroup::Early,
                    completed: tally.early_completed,
                    expected: config.early_callers,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Completion channel disconnected");
                return Err(HarnessError::Disconnected {
                    missing: config.total_callers() - tally.received(),
                });
            }
        }
    }

    Ok(tally)
}

/// Wait until `expected` callers are parked on the gate
///
/// Spins, then yields, then sleeps between polls.
fn await_suspended(gate: &Gate, expected: usize, timeout: Duration) -> Result<(), HarnessError> {
    let deadline = Instant::now() + timeout;
    let mut iteration = 0u32;

    loop {
        let suspended = gate.waiter_count();
        if suspended >= expected {
            debug!(suspended, "Early callers parked");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(HarnessError::NotSuspended {
                suspended,
                expected,
            });
        }

        if iteration < SPIN_LIMIT {
            std::hint::spin_loop();
        } else if iteration < YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(POLL_SLEEP);
        }
        iteration = iteration.saturating_add(1);
    }
}

/// Busy-wait for short race windows that `thread::sleep` can't resolve
fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) -> usize {
    handles
        .into_iter()
        .map(JoinHandle::join)
        .filter(Result::is_err)
        .count()
}
