//! The process core as one value.
//!
//! A [`Kernel`] owns the process table, the per-CPU scheduler state and the
//! two swap queues, plus the [`Platform`] collaborators they are built on.
//! Operations that build contexts capturing the kernel take `&'static self`;
//! boot code leaks or statically allocates the value once.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::memory::Memory;
use crate::process::ProcTable;
use crate::scheduler::CpuTable;
use crate::swap::{Direction, SwapQueue, SwapStats};
use crate::vfs::FileSystem;

/// Collaborators the process core runs on.
pub trait Platform: Send + Sync + 'static {
    type Memory: Memory;
    type Fs: FileSystem;

    fn memory(&self) -> &Self::Memory;
    fn fs(&self) -> &Self::Fs;
}

/// Address space handle of a platform.
pub type SpaceOf<P> = <<P as Platform>::Memory as Memory>::AddressSpace;
/// Open file of a platform.
pub type FileOf<P> = <<P as Platform>::Fs as FileSystem>::File;
/// Inode reference of a platform.
pub type InodeOf<P> = <<P as Platform>::Fs as FileSystem>::Inode;

/// No init record yet.
const NO_INIT: usize = usize::MAX;

/// Process table, scheduler and swap subsystem.
pub struct Kernel<P: Platform> {
    platform: P,
    pub(crate) procs: ProcTable<P>,
    pub(crate) cpus: CpuTable,
    /// Slot of the first user process.
    init_slot: AtomicUsize,
    /// Cleared by the first process to run.
    first_run: AtomicBool,
    pub(crate) evict: SwapQueue,
    pub(crate) restore: SwapQueue,
    pub(crate) stats: SwapStats,
}

impl<P: Platform> Kernel<P> {
    /// Initialize an empty process registry on top of `platform`.
    pub fn new(platform: P) -> Self {
        log::info!("[PROC] Initializing process table ({} slots)", crate::config::NPROC);
        Kernel {
            platform,
            procs: ProcTable::new(),
            cpus: CpuTable::new(),
            init_slot: AtomicUsize::new(NO_INIT),
            first_run: AtomicBool::new(true),
            evict: SwapQueue::new(Direction::Evict),
            restore: SwapQueue::new(Direction::Restore),
            stats: SwapStats::new(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub(crate) fn memory(&self) -> &P::Memory {
        self.platform.memory()
    }

    pub(crate) fn fs(&self) -> &P::Fs {
        self.platform.fs()
    }

    /// Slot of the init record, once created.
    pub fn init_slot(&self) -> Option<usize> {
        match self.init_slot.load(Ordering::Acquire) {
            NO_INIT => None,
            slot => Some(slot),
        }
    }

    pub(crate) fn set_init_slot(&self, slot: usize) {
        self.init_slot.store(slot, Ordering::Release);
    }

    /// True exactly once: for the first caller after boot.
    pub(crate) fn take_first_run(&self) -> bool {
        self.first_run.swap(false, Ordering::AcqRel)
    }

    /// Swap request queue for `direction`.
    pub fn swap_queue(&self, direction: Direction) -> &SwapQueue {
        match direction {
            Direction::Evict => &self.evict,
            Direction::Restore => &self.restore,
        }
    }

    /// Pages written out and read back so far.
    pub fn swap_stats(&self) -> &SwapStats {
        &self.stats
    }
}
