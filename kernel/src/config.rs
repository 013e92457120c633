//! Kernel configuration constants.
//!
//! This module contains compile-time configuration for the process core.
//! Values here fix the capacity of every bounded table and queue.

/// Maximum number of CPUs supported.
pub const NCPU: usize = 8;

/// Number of process slots in the registry.
pub const NPROC: usize = 64;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Page size (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Stack size per kernel process (one page).
pub const KERNEL_STACK_SIZE: usize = PAGE_SIZE;

/// Entries in a page directory.
pub const NPDENTRIES: usize = 1024;

/// Entries in a second-level page table.
pub const NPTENTRIES: usize = 1024;

/// Shift from a virtual address to its page directory index.
pub const PDX_SHIFT: usize = 22;

/// Shift from a virtual address to its page table index.
pub const PTX_SHIFT: usize = 12;

/// Longest process name, including padding.
pub const PROC_NAME_LEN: usize = 16;

/// Usable entries in each swap request ring.
///
/// The ring has `NPROC` cells and sacrifices one of them so that a full
/// ring can be told apart from an empty one.
pub const SWAP_QUEUE_CAPACITY: usize = NPROC - 1;

/// Working directory of the first process.
pub const ROOT_PATH: &str = "/";

/// Name of the first user process.
pub const INIT_NAME: &str = "initcode";

/// Name of the eviction worker.
pub const SWAP_OUT_WORKER: &str = "swap_out";

/// Name of the restore worker.
pub const SWAP_IN_WORKER: &str = "swap_in";

/// Suffix of every backing file.
pub const SWAP_FILE_SUFFIX: &str = ".swp";

/// Interrupt-enable bit in EFLAGS.
pub const FL_IF: u32 = 0x0000_0200;

/// User code segment selector (GDT index 3, RPL 3).
pub const SEG_UCODE: u16 = (3 << 3) | 3;

/// User data segment selector (GDT index 4, RPL 3).
pub const SEG_UDATA: u16 = (4 << 3) | 3;
