//! Per-CPU interrupt nesting.
//!
//! `push_off`/`pop_off` are matched like `cli`/`sti`, except that it takes
//! as many `pop_off`s as `push_off`s to undo them, and interrupts come back
//! on only if they were on before the outermost `push_off`.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::arch;

/// Interrupt bookkeeping for one CPU.
#[derive(Debug)]
pub struct CpuLocal {
    id: usize,
    /// Depth of `push_off` nesting.
    depth: AtomicUsize,
    /// Were interrupts enabled before the outermost `push_off`?
    intena: AtomicBool,
}

impl CpuLocal {
    /// Create the record for CPU `id`.
    pub const fn new(id: usize) -> Self {
        CpuLocal {
            id,
            depth: AtomicUsize::new(0),
            intena: AtomicBool::new(false),
        }
    }

    /// CPU index.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current `push_off` depth.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Saved interrupt state of the outermost `push_off`.
    pub fn intena(&self) -> bool {
        self.intena.load(Ordering::Relaxed)
    }

    /// Overwrite the saved interrupt state.
    ///
    /// `sched` uses this to carry a process's own interrupt state across a
    /// switch, since it belongs to the kernel thread rather than the CPU.
    pub fn set_intena(&self, enabled: bool) {
        self.intena.store(enabled, Ordering::Relaxed);
    }
}

/// Disable interrupts and bump the nesting depth.
pub fn push_off() {
    let arch = arch();
    let enabled = arch.interrupts_enabled();
    arch.disable_interrupts();

    let cpu = arch.cpu();
    if cpu.depth.load(Ordering::Relaxed) == 0 {
        cpu.intena.store(enabled, Ordering::Relaxed);
    }
    cpu.depth.fetch_add(1, Ordering::Relaxed);
}

/// Undo one `push_off`.
pub fn pop_off() {
    let arch = arch();
    if arch.interrupts_enabled() {
        panic!("pop_off: interrupts enabled");
    }

    let cpu = arch.cpu();
    let depth = cpu.depth.load(Ordering::Relaxed);
    if depth == 0 {
        panic!("pop_off: unbalanced");
    }
    cpu.depth.store(depth - 1, Ordering::Relaxed);
    if depth == 1 && cpu.intena.load(Ordering::Relaxed) {
        arch.enable_interrupts();
    }
}
