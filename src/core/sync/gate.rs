/*!
 * Epoch Gate
 *
 * Boolean open/closed gate built on `parking_lot::Mutex` + `Condvar`.
 *
 * # Design: Generation Counter Over Plain Flag Check
 *
 * A waiter that only re-checks `open` after waking can miss an open pulse
 * that is closed again before it gets the lock back, and then blocks
 * forever. Each open→closed transition therefore starts a new generation.
 * A waiter records the generation it blocked in and leaves as soon as the
 * gate is open or the generation has moved on. Every waiter present when
 * `open()` runs is released by that call; a redundant `close()` never
 * releases anyone.
 *
 * No ordering is promised among waiters released by the same `open()`.
 */

use super::cancel::CancelToken;
use super::traits::Wake;
use crate::core::errors::{GateError, GateResult};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// Consistent point-in-time view of a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub open: bool,
    pub generation: u64,
}

struct GateState {
    open: bool,
    generation: u64,
    /// Callers currently suspended in a wait
    waiters: usize,
}

struct GateShared {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Wake for GateShared {
    fn wake(&self) {
        // Lock so a waiter between its token check and `cond.wait` can't miss this
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    fn name(&self) -> &'static str {
        "gate"
    }
}

/// Reusable open/closed gate
///
/// # Examples
///
/// ```
/// use epoch_gate::core::sync::Gate;
/// use std::sync::Arc;
/// use std::thread;
///
/// let gate = Arc::new(Gate::new(false));
/// let waiter = {
///     let gate = gate.clone();
///     thread::spawn(move || gate.wait())
/// };
///
/// gate.open();
/// waiter.join().unwrap();
/// ```
pub struct Gate {
    shared: Arc<GateShared>,
}

impl Gate {
    /// Create a gate in the given initial state, at generation 0
    pub fn new(initially_open: bool) -> Self {
        Self {
            shared: Arc::new(GateShared {
                state: Mutex::new(GateState {
                    open: initially_open,
                    generation: 0,
                    waiters: 0,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Open the gate, releasing every blocked waiter
    ///
    /// Returns `false` without waking anyone if the gate was already open.
    pub fn open(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.open {
            return false;
        }

        state.open = true;
        debug!(
            generation = state.generation,
            waiters = state.waiters,
            "gate opened"
        );
        self.shared.cond.notify_all();
        true
    }

    /// Close the gate and start a new generation
    ///
    /// Never wakes anyone. Returns `false` if the gate was already closed,
    /// in which case the generation is left as is.
    pub fn close(&self) -> bool {
        let mut state = self.shared.state.lock();
        if !state.open {
            return false;
        }

        state.open = false;
        state.generation += 1;
        debug!(generation = state.generation, "gate closed");
        true
    }

    /// Block until the gate is open or the current generation has passed
    ///
    /// Returns at once if the gate is open. On return the gate is not
    /// necessarily still open: an open/close pair may have raced the wake,
    /// but the caller has passed the epoch it blocked in.
    pub fn wait(&self) {
        // Without a token the only way out of the loop is a release
        let _ = self.wait_inner(None);
    }

    /// Like [`Gate::wait`], but gives up with [`GateError::Cancelled`] once
    /// `token` is cancelled
    ///
    /// An open gate returns `Ok(())` without looking at the token. When a
    /// wake finds both the release condition met and the token cancelled,
    /// the release wins and the token stays cancelled for the caller.
    pub fn wait_cancellable(&self, token: &CancelToken) -> GateResult<()> {
        self.wait_inner(Some(token))
    }

    fn wait_inner(&self, token: Option<&CancelToken>) -> GateResult<()> {
        let mut state = self.shared.state.lock();
        if state.open {
            return Ok(());
        }

        // Register before checking the flag: a cancel that slips in between
        // either sees this waker or is visible to the check below
        let _registration = token.map(|token| token.register(self.shared.clone()));
        if token.is_some_and(CancelToken::is_cancelled) {
            trace!("gate wait cancelled before suspending");
            return Err(GateError::Cancelled);
        }

        let observed = state.generation;
        state.waiters += 1;
        trace!(generation = observed, "gate wait suspending");

        let outcome = loop {
            self.shared.cond.wait(&mut state);

            if state.open || state.generation != observed {
                break Ok(());
            }
            if token.is_some_and(CancelToken::is_cancelled) {
                trace!(generation = observed, "gate wait cancelled");
                break Err(GateError::Cancelled);
            }
        };

        state.waiters -= 1;
        outcome
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    /// Read open flag and generation under one lock acquisition
    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.shared.state.lock();
        GateSnapshot {
            open: state.open,
            generation: state.generation,
        }
    }

    /// Number of callers currently suspended in a wait (for diagnostics)
    pub fn waiter_count(&self) -> usize {
        self.shared.state.lock().waiters
    }
}

impl Default for Gate {
    /// A closed gate
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Gate")
            .field("open", &state.open)
            .field("generation", &state.generation)
            .field("waiters", &state.waiters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for_waiters(gate: &Gate, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while gate.waiter_count() < expected {
            assert!(Instant::now() < deadline, "waiters never blocked");
            thread::yield_now();
        }
    }

    #[test]
    fn test_open_gate_does_not_block() {
        let gate = Gate::new(true);
        gate.wait();
        assert_eq!(gate.waiter_count(), 0);
    }

    #[test]
    fn test_default_is_closed() {
        let gate = Gate::default();
        assert_eq!(
            gate.snapshot(),
            GateSnapshot {
                open: false,
                generation: 0
            }
        );
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let gate = Gate::new(false);

        assert!(!gate.close());
        assert_eq!(gate.generation(), 0);

        assert!(gate.open());
        assert!(!gate.open());
        assert_eq!(gate.generation(), 0);

        assert!(gate.close());
        assert!(!gate.close());
        assert_eq!(gate.generation(), 1);
    }

    #[test]
    fn test_round_trip() {
        let gate = Gate::new(true);
        gate.open();
        gate.close();
        gate.open();

        assert!(gate.is_open());
        assert_eq!(gate.generation(), 1);
    }

    #[test]
    fn test_open_releases_all_waiters() {
        let gate = Arc::new(Gate::new(false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || gate.wait())
            })
            .collect();

        wait_for_waiters(&gate, 8);
        assert!(gate.open());

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(gate.waiter_count(), 0);
    }

    #[test]
    fn test_open_close_pulse_releases_prior_waiters() {
        let gate = Arc::new(Gate::new(false));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || gate.wait())
            })
            .collect();

        wait_for_waiters(&gate, 4);

        // Close before any waiter can reacquire the lock
        gate.open();
        gate.close();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!gate.is_open());
        assert_eq!(gate.generation(), 1);
    }

    #[test]
    fn test_redundant_close_does_not_release() {
        let gate = Arc::new(Gate::new(false));
        let token = CancelToken::new();

        let handle = {
            let gate = gate.clone();
            let token = token.clone();
            thread::spawn(move || gate.wait_cancellable(&token))
        };

        wait_for_waiters(&gate, 1);
        assert!(!gate.close());

        // Still parked: only cancellation gets it out now
        assert_eq!(gate.waiter_count(), 1);
        token.cancel();
        assert_eq!(handle.join().unwrap(), Err(GateError::Cancelled));
    }

    #[test]
    fn test_cancel_leaves_state_untouched() {
        let gate = Arc::new(Gate::new(false));
        let token = CancelToken::new();

        let handle = {
            let gate = gate.clone();
            let token = token.clone();
            thread::spawn(move || gate.wait_cancellable(&token))
        };

        wait_for_waiters(&gate, 1);
        let before = gate.snapshot();
        token.cancel();

        assert_eq!(handle.join().unwrap(), Err(GateError::Cancelled));
        assert_eq!(gate.snapshot(), before);
        assert_eq!(gate.waiter_count(), 0);
        assert_eq!(token.registered(), 0);

        // Lock was released: the gate still works
        gate.open();
        gate.wait();
    }

    #[test]
    fn test_release_wins_over_cancel_on_same_wake() {
        let gate = Arc::new(Gate::new(false));
        let token = CancelToken::new();

        let handle = {
            let gate = gate.clone();
            let token = token.clone();
            thread::spawn(move || gate.wait_cancellable(&token))
        };

        wait_for_waiters(&gate, 1);
        {
            // Both conditions become true before the waiter can look
            let mut state = gate.shared.state.lock();
            state.open = true;
            token.mark_cancelled();
            gate.shared.cond.notify_all();
        }

        assert_eq!(handle.join().unwrap(), Ok(()));
        assert!(token.is_cancelled());
        assert_eq!(gate.waiter_count(), 0);
    }

    #[test]
    fn test_cancelled_token_on_open_gate_passes() {
        let gate = Gate::new(true);
        let token = CancelToken::new();
        token.cancel();

        assert_eq!(gate.wait_cancellable(&token), Ok(()));
    }

    #[test]
    fn test_cancelled_token_on_closed_gate_fails_fast() {
        let gate = Gate::new(false);
        let token = CancelToken::new();
        token.cancel();

        assert_eq!(gate.wait_cancellable(&token), Err(GateError::Cancelled));
        assert_eq!(gate.waiter_count(), 0);
    }
}
