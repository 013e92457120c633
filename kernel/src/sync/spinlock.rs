//! Spinlock with interrupt nesting and ownership tracking.
//!
//! Acquiring disables interrupts on the executing CPU (through
//! [`push_off`](crate::arch::push_off)) so an interrupt handler can never
//! spin on a lock its own CPU already holds. The lock also remembers which
//! CPU holds it, so re-acquiring or releasing someone else's lock is caught.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::arch::{self, pop_off, push_off};

/// Busy-waiting mutual exclusion lock.
pub struct SpinLock<T> {
    name: &'static str,
    locked: AtomicBool,
    /// Holding CPU plus one; zero while free.
    owner: AtomicUsize,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `locked`.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create an unlocked spinlock. `name` appears in panic messages.
    pub const fn new(name: &'static str, data: T) -> Self {
        SpinLock {
            name,
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Lock name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spin until the lock is ours.
    ///
    /// # Panics
    ///
    /// Panics if the executing CPU already holds the lock.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        push_off();
        if self.holding() {
            panic!("acquire: {} already held", self.name);
        }

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
        self.owner.store(arch::cpu_id() + 1, Ordering::Relaxed);

        SpinLockGuard { lock: self }
    }

    /// Does the executing CPU hold this lock?
    pub fn holding(&self) -> bool {
        push_off();
        let held =
            self.locked.load(Ordering::Relaxed) && self.owner.load(Ordering::Relaxed) == arch::cpu_id() + 1;
        pop_off();
        held
    }

    fn release(&self) {
        if !self.holding() {
            panic!("release: {} not held", self.name);
        }
        self.owner.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        pop_off();
    }

    /// Release a lock whose guard lives on another kernel stack.
    ///
    /// # Safety
    ///
    /// Only for a lock that was handed across a context switch: the executing
    /// CPU holds it, and the guard that acquired it will not be dropped
    /// before the lock is re-acquired on the far side of a later switch.
    pub unsafe fn force_release(&self) {
        self.release();
    }

    /// Read the protected data without locking.
    ///
    /// # Safety
    ///
    /// The result may be torn or stale. Only for diagnostics that must work
    /// when the lock is wedged.
    pub unsafe fn get_unchecked(&self) -> &T {
        // SAFETY: the caller accepts racy reads.
        unsafe { &*self.data.get() }
    }

    /// Exclusive access through a unique reference; no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Proof of holding a [`SpinLock`]; releases it on drop.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> SpinLockGuard<'a, T> {
    /// Release the lock, returning it so the caller can take it again later.
    pub fn unlock(guard: Self) -> &'a SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }

    /// The lock this guard holds.
    pub fn lock_of(guard: &Self) -> &'a SpinLock<T> {
        guard.lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the lock is held.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
