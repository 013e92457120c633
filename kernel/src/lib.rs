//! KProc process core
//!
//! The process table and its state machine, a per-CPU round-robin
//! scheduler, sleep/wakeup, and demand-paging swap, for a small
//! multiprocessor kernel.
//!
//! # Collaborators
//!
//! - [`arch::Arch`]: context switch, interrupt flag, return to user mode;
//! - [`memory::Memory`]: frames and address spaces;
//! - [`vfs::FileSystem`]: files for open descriptors and swap pages.
//!
//! Boot installs the [`arch::Arch`] hook, builds one [`Kernel`], creates
//! the first process with [`Kernel::userinit`], and enters
//! [`Kernel::scheduler`] on every CPU.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod swap;
pub mod sync;
pub mod vfs;

#[cfg(test)]
mod tests;

pub use kernel::{Kernel, Platform};
pub use process::{Pid, ProcError, ProcState};
pub use swap::{Direction, SwapError};
