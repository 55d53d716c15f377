/*!
 * Countdown Latch
 *
 * One-shot latch: waiters block until the count reaches zero. Used by the
 * demonstration harness as the trigger for its late callers.
 */

use super::cancel::CancelToken;
use super::traits::Wake;
use crate::core::errors::{GateError, GateResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::trace;

struct LatchShared {
    remaining: Mutex<usize>,
    cond: Condvar,
}

impl Wake for LatchShared {
    fn wake(&self) {
        let _remaining = self.remaining.lock();
        self.cond.notify_all();
    }

    fn name(&self) -> &'static str {
        "latch"
    }
}

pub struct CountDownLatch {
    shared: Arc<LatchShared>,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            shared: Arc::new(LatchShared {
                remaining: Mutex::new(count),
                cond: Condvar::new(),
            }),
        }
    }

    /// Decrement the count, releasing all waiters when it hits zero
    ///
    /// No-op once the count is already zero.
    pub fn count_down(&self) {
        let mut remaining = self.shared.remaining.lock();
        if *remaining == 0 {
            return;
        }

        *remaining -= 1;
        if *remaining == 0 {
            trace!("latch released");
            self.shared.cond.notify_all();
        }
    }

    pub fn count(&self) -> usize {
        *self.shared.remaining.lock()
    }

    /// Block until the count reaches zero
    pub fn wait(&self) {
        let mut remaining = self.shared.remaining.lock();
        while *remaining > 0 {
            self.shared.cond.wait(&mut remaining);
        }
    }

    /// Block until the count reaches zero or `token` is cancelled
    ///
    /// A released latch wins over a cancelled token.
    pub fn wait_cancellable(&self, token: &CancelToken) -> GateResult<()> {
        let mut remaining = self.shared.remaining.lock();
        if *remaining == 0 {
            return Ok(());
        }

        let _registration = token.register(self.shared.clone());
        while *remaining > 0 {
            if token.is_cancelled() {
                return Err(GateError::Cancelled);
            }
            self.shared.cond.wait(&mut remaining);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CountDownLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountDownLatch")
            .field("count", &self.count())
            .finish()
    }
}
