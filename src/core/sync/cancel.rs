/*!
 * Cancellation Token
 *
 * Rust threads cannot be interrupted, so blocked waits take an explicit
 * token instead. Cancelling the token wakes every wait currently registered
 * with it; each one then reports `GateError::Cancelled` unless its release
 * condition was already met.
 *
 * # Locking
 *
 * `cancel()` snapshots the registered wakers under the token lock and
 * releases it before waking anyone. Waiters register while holding their
 * primitive's lock. The two locks are therefore never held together by the
 * cancelling thread.
 */

use super::traits::Wake;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

struct TokenInner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    wakers: Mutex<Vec<(u64, Arc<dyn Wake>)>>,
}

/// Shared cancellation signal for blocking waits
///
/// Clones observe and control the same signal.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                wakers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cancel every current and future wait that uses this token
    ///
    /// Idempotent: only the first call wakes registered waiters.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let wakers: Vec<Arc<dyn Wake>> = self
            .inner
            .wakers
            .lock()
            .iter()
            .map(|(_, waker)| Arc::clone(waker))
            .collect();

        trace!(registered = wakers.len(), "cancel token fired");

        for waker in wakers {
            trace!(primitive = waker.name(), "waking cancelled waiter");
            waker.wake();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Number of waits currently registered (for diagnostics)
    pub fn registered(&self) -> usize {
        self.inner.wakers.lock().len()
    }

    /// Set the flag without waking anyone, for tests that hold a primitive's lock
    #[cfg(test)]
    pub(crate) fn mark_cancelled(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Register a waker for the lifetime of the returned guard
    pub(crate) fn register(&self, waker: Arc<dyn Wake>) -> Registration<'_> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.wakers.lock().push((id, waker));
        Registration { token: self, id }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes its waker from the token on drop
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut wakers = self.token.inner.wakers.lock();
        if let Some(pos) = wakers.iter().position(|(id, _)| *id == self.id) {
            wakers.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_cancel_wakes_registered_once() {
        let token = CancelToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        let _registration = token.register(waker.clone());
        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(waker.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_removed_on_drop() {
        let token = CancelToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        {
            let _first = token.register(waker.clone());
            let _second = token.register(waker.clone());
            assert_eq!(token.registered(), 2);
        }
        assert_eq!(token.registered(), 0);

        token.cancel();
        assert_eq!(waker.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();

        clone.cancel();
        assert!(token.is_cancelled());
    }
}
