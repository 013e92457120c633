//! Per-CPU scheduler.
//!
//! Every CPU runs [`Kernel::scheduler`] forever: scan the process table in
//! slot order, switch to the first runnable record, and resume scanning
//! when that record switches back. The registry lock is held across every
//! switch in both directions; the side that resumes is the side that
//! releases it.

pub mod context;

use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::{self, pop_off, push_off};
use crate::config::{NCPU, NPROC};
use crate::kernel::{Kernel, Platform};
use crate::memory::Memory;
use crate::process::{Pid, ProcState, RegistryGuard};
use crate::sync::SpinLockGuard;
use crate::vfs::FileSystem;

pub use context::Context;

/// Scheduler state of one CPU.
pub(crate) struct PerCpu {
    /// Slot running on this CPU, if any.
    proc: Cell<Option<usize>>,
    /// Where `sched` returns to.
    scheduler: UnsafeCell<Context>,
}

impl PerCpu {
    const fn new() -> Self {
        PerCpu {
            proc: Cell::new(None),
            scheduler: UnsafeCell::new(Context::new(0)),
        }
    }

    pub(crate) fn proc(&self) -> Option<usize> {
        self.proc.get()
    }

    fn set_proc(&self, slot: Option<usize>) {
        self.proc.set(slot);
    }

    fn scheduler_context(&self) -> *mut Context {
        self.scheduler.get()
    }
}

/// Scheduler state of every CPU.
pub(crate) struct CpuTable {
    cpus: [PerCpu; NCPU],
    switches: AtomicU64,
}

// SAFETY: each `PerCpu` is only touched by its own CPU with interrupts
// disabled.
unsafe impl Sync for CpuTable {}
unsafe impl Send for CpuTable {}

impl CpuTable {
    pub(crate) const fn new() -> Self {
        const IDLE: PerCpu = PerCpu::new();
        CpuTable {
            cpus: [IDLE; NCPU],
            switches: AtomicU64::new(0),
        }
    }
}

impl<P: Platform> Kernel<P> {
    /// Scheduler state of the executing CPU. Interrupts must be disabled.
    pub(crate) fn my_cpu(&self) -> &PerCpu {
        let arch = arch::arch();
        if arch.interrupts_enabled() {
            panic!("my_cpu called with interrupts enabled");
        }
        let id = arch.cpu().id();
        match self.cpus.cpus.get(id) {
            Some(cpu) => cpu,
            None => panic!("my_cpu: unknown cpu {}", id),
        }
    }

    /// Slot of the process running on this CPU.
    pub fn current(&self) -> Option<usize> {
        push_off();
        let slot = self.my_cpu().proc();
        pop_off();
        slot
    }

    /// Slot of the running process; calling this outside a process is a
    /// kernel bug.
    pub(crate) fn current_slot(&self, what: &str) -> usize {
        match self.current() {
            Some(slot) => slot,
            None => panic!("{}: no current process", what),
        }
    }

    /// Pid of the process running on this CPU.
    pub fn current_pid(&self) -> Option<Pid> {
        let slot = self.current()?;
        Some(self.procs.lock().pid(slot))
    }

    /// Context switches performed by all schedulers.
    pub fn context_switches(&self) -> u64 {
        self.cpus.switches.load(Ordering::Relaxed)
    }

    /// Run processes on this CPU forever.
    ///
    /// Must be entered with interrupts disabled, once per CPU, on the CPU's
    /// own boot stack.
    pub fn scheduler(&'static self) -> ! {
        let arch = arch::arch();
        log::info!("[SCHED] cpu{} starting", arch.cpu().id());
        self.my_cpu().set_proc(None);

        loop {
            // Let devices interrupt an idle CPU.
            arch.enable_interrupts();

            let mut reg = self.procs.lock();
            let mut dispatched = false;
            for slot in 0..NPROC {
                if reg.state(slot) != ProcState::Runnable {
                    continue;
                }
                self.dispatch(&mut reg, slot);
                dispatched = true;
            }
            drop(reg);

            if !dispatched {
                arch.idle();
            }
        }
    }

    /// Run `slot` until it gives the CPU back.
    fn dispatch(&self, reg: &mut RegistryGuard<'_>, slot: usize) {
        let arch = arch::arch();
        let cpu = self.my_cpu();

        {
            // SAFETY: the record is runnable, so it is not executing
            // anywhere, and the registry lock keeps it that way.
            let data = unsafe { self.procs.data(slot) };
            let (Some(space), Some(stack)) = (data.space.as_ref(), data.kstack.as_ref()) else {
                panic!("scheduler: runnable slot {} has no address space", slot);
            };
            cpu.set_proc(Some(slot));
            self.memory().switch_uvm(space, stack);
        }
        reg.set_running(slot);

        #[cfg(feature = "trace-scheduler")]
        log::trace!("[SCHED] cpu{} -> pid {}", arch.cpu().id(), reg.pid(slot));

        self.cpus.switches.fetch_add(1, Ordering::Relaxed);
        // SAFETY: interrupts are off and both contexts stay valid; the
        // process gives the registry lock back before switching here.
        unsafe { arch.switch(cpu.scheduler_context(), self.procs.context_ptr(slot)) };
        self.memory().switch_kvm();

        // The process changed its own state before coming back.
        cpu.set_proc(None);
        if reg.state(slot) == ProcState::Unused {
            self.reclaim(slot);
        }
    }

    /// Free what a retired kernel process left behind.
    fn reclaim(&self, slot: usize) {
        // SAFETY: the record retired itself and never runs again; the
        // registry lock keeps the slot from being claimed meanwhile.
        let data = unsafe { self.procs.data(slot) };
        if let Some(stack) = data.kstack.take() {
            self.memory().free_frame(stack.frame());
        }
        if let Some(space) = data.space.take() {
            self.memory().free_vm(space);
        }
        log::debug!("[SCHED] reclaimed retired slot {}", slot);
    }

    /// Switch from the current process back to this CPU's scheduler.
    ///
    /// The caller holds the registry lock and nothing else, and has already
    /// moved the process out of `Running`. The guard comes back when the
    /// process is next scheduled, possibly on another CPU.
    pub(crate) fn sched<'a>(&self, reg: RegistryGuard<'a>) -> RegistryGuard<'a> {
        let arch = arch::arch();
        let slot = self.current_slot("sched");

        if !SpinLockGuard::lock_of(&reg).holding() {
            panic!("sched: registry lock not held");
        }
        if arch.cpu().depth() != 1 {
            panic!("sched: locks held");
        }
        if reg.state(slot) == ProcState::Running {
            panic!("sched: process running");
        }
        if arch.interrupts_enabled() {
            panic!("sched: interruptible");
        }

        let intena = arch.cpu().intena();
        let scheduler = self.my_cpu().scheduler_context();
        // SAFETY: checked above; the scheduler context was saved when it
        // dispatched this process.
        unsafe { arch.switch(self.procs.context_ptr(slot), scheduler) };
        // Possibly a different CPU now.
        arch.cpu().set_intena(intena);
        reg
    }

    /// Give up the CPU for one scheduling round.
    pub fn yield_now(&self) {
        let slot = self.current_slot("yield");
        let mut reg = self.procs.lock();
        reg.set_runnable(slot);
        drop(self.sched(reg));
    }

    /// First code a new process runs, on its own kernel stack.
    pub(crate) fn fork_return(&self) {
        // SAFETY: the scheduler acquired the registry lock before
        // switching here; its guard stays on the scheduler's stack.
        unsafe { self.procs.registry().force_release() };

        if self.take_first_run() {
            // Needs a process context, so it cannot run from boot.
            log::info!("[SCHED] first process running, finishing filesystem setup");
            self.fs().init();
        }
    }
}
