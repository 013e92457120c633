//! Memory collaborator contract.
//!
//! The process core consumes address spaces and physical frames through the
//! [`Memory`] trait; it never builds page tables itself. The one exception is
//! the replacement sweep, which edits second-level entries in place through
//! [`PageTableWalk`].

pub mod page_table;
pub mod replacement;

use core::fmt;

use crate::config::{KERNEL_STACK_SIZE, PAGE_SIZE};

pub use page_table::{PageTable, PageTableEntry, PageTableWalk, PteFlags};
pub use replacement::{has_resident_page, select_victim, Victim};

/// A page-aligned physical frame, identified by its start address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysFrame(usize);

impl PhysFrame {
    /// Frame starting at `addr`, if `addr` is page aligned.
    pub fn from_start_address(addr: usize) -> Option<Self> {
        if addr % PAGE_SIZE == 0 {
            Some(PhysFrame(addr))
        } else {
            None
        }
    }

    /// Frame containing `addr`.
    pub const fn containing(addr: usize) -> Self {
        PhysFrame(addr & !(PAGE_SIZE - 1))
    }

    /// Physical start address.
    pub const fn start_address(self) -> usize {
        self.0
    }
}

/// Kernel stack owned by one process record.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelStack {
    frame: PhysFrame,
}

impl KernelStack {
    /// Use `frame` as a kernel stack.
    pub fn new(frame: PhysFrame) -> Self {
        KernelStack { frame }
    }

    /// Backing frame.
    pub fn frame(&self) -> PhysFrame {
        self.frame
    }

    /// Initial stack pointer (the stack grows down).
    pub fn top(&self) -> usize {
        self.frame.start_address() + KERNEL_STACK_SIZE
    }
}

/// Page table mapping errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The virtual page already has a present mapping.
    AlreadyMapped,
    /// No frame for an intermediate table.
    OutOfMemory,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::AlreadyMapped => write!(f, "page already mapped"),
            MapError::OutOfMemory => write!(f, "out of memory for page table"),
        }
    }
}

/// Address-space and frame primitives supplied by the platform.
pub trait Memory: Send + Sync {
    /// Handle to a page directory and everything it maps.
    type AddressSpace: PageTableWalk + Send;

    /// Allocate one zeroed physical frame.
    fn alloc_frame(&self) -> Option<PhysFrame>;

    /// Return a frame to the allocator.
    fn free_frame(&self, frame: PhysFrame);

    /// Run `f` over the bytes of `frame`.
    fn with_frame<R>(&self, frame: PhysFrame, f: impl FnOnce(&mut [u8]) -> R) -> R;

    /// New address space holding only the kernel mappings.
    fn setup_kvm(&self) -> Option<Self::AddressSpace>;

    /// Load `image` at virtual address 0 of a fresh address space. The
    /// image must fit in one page.
    fn init_uvm(&self, space: &mut Self::AddressSpace, image: &[u8]) -> Result<(), MapError>;

    /// Deep copy of the user part `[0, size)` of `space`.
    fn copy_uvm(&self, space: &Self::AddressSpace, size: usize) -> Option<Self::AddressSpace>;

    /// Grow the user part from `old` to `new` bytes, returning the new size.
    /// On failure nothing stays allocated and the size is still `old`.
    fn alloc_uvm(&self, space: &mut Self::AddressSpace, old: usize, new: usize) -> Option<usize>;

    /// Shrink the user part from `old` to `new` bytes, returning the new size.
    fn dealloc_uvm(&self, space: &mut Self::AddressSpace, old: usize, new: usize) -> usize;

    /// Free every user frame, every table, and the directory.
    fn free_vm(&self, space: Self::AddressSpace);

    /// Map `va` to `frame` with `perm | PRESENT`.
    fn map_page(
        &self,
        space: &mut Self::AddressSpace,
        va: usize,
        frame: PhysFrame,
        perm: PteFlags,
    ) -> Result<(), MapError>;

    /// Load `space` and point the task state at `stack`.
    fn switch_uvm(&self, space: &Self::AddressSpace, stack: &KernelStack);

    /// Load the kernel-only page directory.
    fn switch_kvm(&self);
}
