/*!
 * Async Epoch Gate
 *
 * Gate for tokio tasks. State lives in a `watch` channel whose value is the
 * current [`GateSnapshot`]; waiters subscribe and wait for
 * `open || generation != observed`, the same release rule as [`Gate`].
 *
 * Closing a closed gate does not touch the channel, so it never wakes a
 * subscriber. A waiter is cancelled by dropping its future.
 *
 * [`Gate`]: super::Gate
 */

use super::gate::GateSnapshot;
use tokio::sync::watch;
use tracing::{debug, trace};

pub struct AsyncGate {
    tx: watch::Sender<GateSnapshot>,
}

impl AsyncGate {
    pub fn new(initially_open: bool) -> Self {
        let (tx, _rx) = watch::channel(GateSnapshot {
            open: initially_open,
            generation: 0,
        });
        Self { tx }
    }

    /// Open the gate, waking every waiting task
    ///
    /// Returns `false` if the gate was already open.
    pub fn open(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.open {
                return false;
            }
            state.open = true;
            debug!(
                generation = state.generation,
                subscribers = self.tx.receiver_count(),
                "async gate opened"
            );
            true
        })
    }

    /// Close the gate and start a new generation
    ///
    /// Returns `false` if the gate was already closed.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.open {
                return false;
            }
            state.open = false;
            state.generation += 1;
            debug!(generation = state.generation, "async gate closed");
            true
        })
    }

    /// Wait until the gate is open or the current generation has passed
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let observed = {
            let state = rx.borrow_and_update();
            if state.open {
                return;
            }
            state.generation
        };

        trace!(generation = observed, "async gate wait suspending");

        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx
            .wait_for(|state| state.open || state.generation != observed)
            .await;
    }

    pub fn snapshot(&self) -> GateSnapshot {
        *self.tx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.tx.borrow().open
    }

    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }
}

impl Default for AsyncGate {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_gate_returns_immediately() {
        let gate = AsyncGate::new(true);
        gate.wait().await;
    }

    #[tokio::test]
    async fn test_pulse_releases_waiting_tasks() {
        let gate = Arc::new(AsyncGate::new(false));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();

        // Let every task subscribe before the pulse
        while gate.tx.receiver_count() < 16 {
            tokio::task::yield_now().await;
        }

        assert!(gate.open());
        assert!(gate.close());

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("waiter hung")
                .unwrap();
        }
        assert_eq!(gate.generation(), 1);
    }

    #[tokio::test]
    async fn test_redundant_close_keeps_waiter_blocked() {
        let gate = Arc::new(AsyncGate::new(false));

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        while gate.tx.receiver_count() < 1 {
            tokio::task::yield_now().await;
        }

        assert!(!gate.close());
        let blocked = tokio::time::timeout(Duration::from_millis(50), async {
            while !waiter.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(blocked.is_err());

        gate.open();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_wait_leaves_state_untouched() {
        let gate = AsyncGate::new(false);
        let before = gate.snapshot();

        let result = tokio::time::timeout(Duration::from_millis(10), gate.wait()).await;
        assert!(result.is_err());
        assert_eq!(gate.snapshot(), before);
    }
}
