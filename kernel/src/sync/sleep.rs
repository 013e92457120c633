//! Sleep and wakeup.
//!
//! The blocking primitive for the whole kernel. A sleeper records its
//! channel and goes `Sleeping` under the registry lock; a waker scans for
//! that channel under the same lock. The sleeper takes the registry lock
//! before it lets go of its own lock, so a waker that needs the sleeper's
//! lock to change the condition cannot run in between.

use super::{Channel, SpinLockGuard};
use crate::kernel::{Kernel, Platform};
use crate::process::RegistryGuard;

impl<P: Platform> Kernel<P> {
    /// Release `guard`, block on `channel`, and reacquire the lock once
    /// woken.
    ///
    /// Wakeups can be spurious (a `kill`, or a shared channel), so callers
    /// re-check their condition in a loop. `guard` must not be the registry
    /// lock; use [`Kernel::sleep_registry`] for that.
    pub fn sleep<'a, T>(&self, channel: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let slot = self.current_slot("sleep");

        let reg = self.procs.lock();
        let lock = SpinLockGuard::unlock(guard);

        let reg = self.block(slot, channel, reg);
        drop(reg);
        lock.lock()
    }

    /// [`Kernel::sleep`] for a caller already holding the registry lock.
    pub fn sleep_registry<'a>(&self, channel: Channel, reg: RegistryGuard<'a>) -> RegistryGuard<'a> {
        let slot = self.current_slot("sleep");
        self.block(slot, channel, reg)
    }

    fn block<'a>(&self, slot: usize, channel: Channel, mut reg: RegistryGuard<'a>) -> RegistryGuard<'a> {
        reg.sleep_on(slot, channel);
        let mut reg = self.sched(reg);
        reg.clear_channel(slot);
        reg
    }

    /// Make every process sleeping on `channel` runnable.
    pub fn wakeup(&self, channel: Channel) {
        let mut reg = self.procs.lock();
        Self::wakeup_locked(&mut reg, channel);
    }

    /// [`Kernel::wakeup`] for a caller already holding the registry lock.
    pub fn wakeup_locked(reg: &mut RegistryGuard<'_>, channel: Channel) {
        reg.wake_channel(channel);
    }
}
