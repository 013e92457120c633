//! Demand-paging swap subsystem.
//!
//! A process that wants a page evicted, or that faulted on a page that was
//! evicted, queues itself on the matching [`SwapQueue`] and sleeps. A
//! kernel worker per direction drains the queue:
//!
//! - evict: pick a victim page with the second-chance sweep, write it to
//!   its swap file, free the frame;
//! - restore: read the swap file into a fresh frame and map it back at the
//!   faulting address.
//!
//! Either way the worker then wakes the requester. A worker is started by
//! whoever finds its queue without one, and retires once the queue is
//! empty.

pub mod queue;
pub mod store;
pub mod worker;

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::{SWAP_IN_WORKER, SWAP_OUT_WORKER};
use crate::memory::MapError;
use crate::process::ProcError;
use crate::vfs::FsError;

pub use queue::{RequestRing, SwapQueue};
pub use store::{swap_file_name, SwapStore};

/// Which way a queue moves pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Memory to swap file.
    Evict,
    /// Swap file to memory.
    Restore,
}

impl Direction {
    /// Name of the worker process serving this direction.
    pub fn worker_name(self) -> &'static str {
        match self {
            Direction::Evict => SWAP_OUT_WORKER,
            Direction::Restore => SWAP_IN_WORKER,
        }
    }
}

/// Swap subsystem error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// The request queue is full
    QueueFull,
    /// The faulting address is not swapped out
    NotSwapped,
    /// The process has no resident page to evict
    NoResidentPage,
    /// The worker process could not be started
    Worker(ProcError),
    /// Filesystem failure
    Fs(FsError),
    /// Page table failure
    Map(MapError),
    /// A page moved only partially
    ShortTransfer { expected: usize, actual: usize },
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapError::QueueFull => write!(f, "swap queue full"),
            SwapError::NotSwapped => write!(f, "page is not swapped out"),
            SwapError::NoResidentPage => write!(f, "no resident page"),
            SwapError::Worker(err) => write!(f, "cannot start swap worker: {}", err),
            SwapError::Fs(err) => write!(f, "swap file: {}", err),
            SwapError::Map(err) => write!(f, "swap mapping: {}", err),
            SwapError::ShortTransfer { expected, actual } => {
                write!(f, "short swap transfer: {} of {} bytes", actual, expected)
            }
        }
    }
}

impl From<FsError> for SwapError {
    fn from(err: FsError) -> Self {
        SwapError::Fs(err)
    }
}

impl From<ProcError> for SwapError {
    fn from(err: ProcError) -> Self {
        SwapError::Worker(err)
    }
}

/// Pages moved by the workers.
#[derive(Debug, Default)]
pub struct SwapStats {
    evicted: AtomicU64,
    restored: AtomicU64,
}

impl SwapStats {
    pub const fn new() -> Self {
        SwapStats {
            evicted: AtomicU64::new(0),
            restored: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, direction: Direction) {
        #[cfg(feature = "swap-stats")]
        match direction {
            Direction::Evict => self.evicted.fetch_add(1, Ordering::Relaxed),
            Direction::Restore => self.restored.fetch_add(1, Ordering::Relaxed),
        };
        #[cfg(not(feature = "swap-stats"))]
        let _ = direction;
    }

    /// Pages written out.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Pages read back.
    pub fn restored(&self) -> u64 {
        self.restored.load(Ordering::Relaxed)
    }
}
