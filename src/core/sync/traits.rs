/*!
 * Synchronization Traits
 *
 * Seam between cancellation sources and the primitives that block on them.
 */

/// Something a cancellation source can poke to re-check its wait condition
///
/// Implementations must take whatever lock guards the waiter's condition
/// before broadcasting, otherwise a waiter that has checked the source but
/// not yet suspended can miss the wake.
pub(crate) trait Wake: Send + Sync {
    /// Wake every waiter parked on this primitive
    fn wake(&self);

    /// Primitive name for tracing
    fn name(&self) -> &'static str;
}
