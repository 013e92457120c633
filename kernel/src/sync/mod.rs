//! Synchronization primitives.
//!
//! Spinlocks for short critical sections, and the channel type used by
//! `sleep`/`wakeup` to block a process until an event.

pub mod sleep;
pub mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};

/// Opaque identifier a sleeping process waits on.
///
/// Equality is the only thing that matters: `wakeup(c)` makes runnable
/// every process sleeping on a channel equal to `c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// A process record, by slot. Parents wait on their own slot for
    /// children to exit.
    Proc(usize),
    /// Completion of the swap request a process has in flight.
    Swap(usize),
    /// Any other event, keyed by an address.
    Addr(usize),
}
