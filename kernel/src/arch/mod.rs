//! Processor hook.
//!
//! The process core never touches registers directly. Everything that does,
//! the raw context switch, the interrupt flag, and the return to user mode,
//! is supplied by the platform through [`Arch`] and installed once at boot.

pub mod cpu;

use alloc::boxed::Box;
use spin::Once;

use crate::memory::KernelStack;
use crate::process::TrapFrame;
use crate::scheduler::Context;

pub use cpu::{pop_off, push_off, CpuLocal};

/// Machine operations the scheduler is built on.
pub trait Arch: Sync {
    /// Per-CPU record of the processor executing the caller.
    ///
    /// Only meaningful while interrupts are disabled; otherwise the caller
    /// may migrate before using the result.
    fn cpu(&self) -> &'static CpuLocal;

    /// Whether the executing CPU accepts interrupts.
    fn interrupts_enabled(&self) -> bool;

    /// Enable interrupts on the executing CPU.
    fn enable_interrupts(&self);

    /// Disable interrupts on the executing CPU.
    fn disable_interrupts(&self);

    /// Build a saved context that runs `entry` on `stack` the first time it
    /// is switched to.
    fn new_context(&self, stack: &KernelStack, entry: Box<dyn FnOnce() + Send>) -> Context;

    /// Save the running context into `save` and resume `load`.
    ///
    /// Returns when some other CPU or context switches back to `save`.
    ///
    /// # Safety
    ///
    /// - Both pointers must be valid for the duration of the switch.
    /// - `load` must hold a context produced by [`Arch::new_context`] or by
    ///   an earlier `switch`.
    /// - Interrupts must be disabled.
    unsafe fn switch(&self, save: *mut Context, load: *const Context);

    /// Restore `frame` and drop to user mode.
    fn enter_user(&self, frame: &TrapFrame) -> !;

    /// Hint that a scheduler pass found nothing runnable.
    fn idle(&self) {}
}

static ARCH: Once<&'static dyn Arch> = Once::new();

/// Install the processor hook. Later calls are ignored.
pub fn install(arch: &'static dyn Arch) {
    ARCH.call_once(|| arch);
}

/// The installed processor hook.
///
/// # Panics
///
/// Panics if [`install`] has not run; nothing in the process core can work
/// without it.
pub fn arch() -> &'static dyn Arch {
    match ARCH.get() {
        Some(arch) => *arch,
        None => panic!("arch: no processor hook installed"),
    }
}

/// Identifier of the executing CPU. Interrupts must be disabled.
pub fn cpu_id() -> usize {
    arch().cpu().id()
}
