/*!
 * Synchronization Primitives
 *
 * Gate-style wait/notify built on `parking_lot` mutexes and condvars:
 * - `Gate`: open/closed gate with generation-tracked waits
 * - `AsyncGate`: the same contract for tokio tasks
 * - `CountDownLatch`: one-shot countdown trigger
 * - `CancelToken`: cancellation for blocking waits
 *
 * # Architecture
 *
 * Every blocking primitive guards its state with one mutex and parks
 * waiters on one condvar. Waits re-check their condition under the lock
 * after each wake, so spurious wakeups and wakes caused by cancellation of
 * other waiters are harmless.
 */

mod async_gate;
mod cancel;
mod gate;
mod latch;
mod traits;

pub use async_gate::AsyncGate;
pub use cancel::CancelToken;
pub use gate::{Gate, GateSnapshot};
pub use latch::CountDownLatch;
