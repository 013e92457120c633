//! Two-level page table entries.
//!
//! A 32-bit virtual address splits into a 10-bit directory index, a 10-bit
//! table index and a 12-bit page offset. The process core only walks the
//! second level; building and tearing down tables is the memory
//! collaborator's business.

use core::fmt;

use bitflags::bitflags;

use super::PhysFrame;
use crate::config::{NPTENTRIES, PAGE_SIZE, PDX_SHIFT, PTX_SHIFT};

bitflags! {
    /// Page table entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        /// Page is present in memory.
        const PRESENT = 1 << 0;
        /// Page is writable.
        const WRITABLE = 1 << 1;
        /// Page is accessible from user mode.
        const USER = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Disable caching.
        const NO_CACHE = 1 << 4;
        /// Page has been accessed (the reference bit).
        const ACCESSED = 1 << 5;
        /// Page has been written to.
        const DIRTY = 1 << 6;
        /// Page lives in a swap file. Only set on entries that are not
        /// present, where the hardware ignores it.
        const SWAPPED = 1 << 7;
    }
}

/// Physical address bits of an entry.
const ADDR_MASK: u32 = 0xFFFF_F000;

/// A single page table entry.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// Create an empty (not present) entry.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Entry mapping `frame` with `flags`.
    pub fn new(frame: PhysFrame, flags: PteFlags) -> Self {
        Self((frame.start_address() as u32 & ADDR_MASK) | flags.bits())
    }

    /// Entry for a page that was written out to its swap file.
    pub const fn swapped_out() -> Self {
        Self(PteFlags::SWAPPED.bits())
    }

    /// Raw entry bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Get the flags of this entry.
    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    pub fn is_user(&self) -> bool {
        self.flags().contains(PteFlags::USER)
    }

    pub fn is_accessed(&self) -> bool {
        self.flags().contains(PteFlags::ACCESSED)
    }

    /// Whether a fault here must be served from the swap file.
    pub fn is_swapped(&self) -> bool {
        !self.is_present() && self.flags().contains(PteFlags::SWAPPED)
    }

    /// Frame the entry points at. Meaningless unless present.
    pub fn frame(&self) -> PhysFrame {
        PhysFrame::containing(self.0 as usize & ADDR_MASK as usize)
    }

    /// Set the reference bit, as the MMU does on access.
    pub fn mark_accessed(&mut self) {
        self.0 |= PteFlags::ACCESSED.bits();
    }

    /// Clear the reference bit, giving the page a second chance.
    pub fn clear_accessed(&mut self) {
        self.0 &= !PteFlags::ACCESSED.bits();
    }

    /// Set the entry as unused.
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("addr", &format_args!("{:#x}", self.0 & ADDR_MASK))
            .field("flags", &self.flags())
            .finish()
    }
}

/// A second-level page table.
pub type PageTable = [PageTableEntry; NPTENTRIES];

/// Page directory index of `va`.
pub const fn pdx(va: usize) -> usize {
    (va >> PDX_SHIFT) & 0x3FF
}

/// Page table index of `va`.
pub const fn ptx(va: usize) -> usize {
    (va >> PTX_SHIFT) & 0x3FF
}

/// Virtual address of the page at directory index `pdx`, table index `ptx`.
pub const fn page_address(pdx: usize, ptx: usize) -> usize {
    (pdx << PDX_SHIFT) | (ptx << PTX_SHIFT)
}

/// Round `va` down to its page boundary.
pub const fn page_round_down(va: usize) -> usize {
    va & !(PAGE_SIZE - 1)
}

/// Round `size` up to a whole number of pages.
pub const fn page_round_up(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Walk access to the second level of an address space.
pub trait PageTableWalk {
    /// Second-level table under directory entry `pdx`, if that directory
    /// entry is present.
    fn table_mut(&mut self, pdx: usize) -> Option<&mut PageTable>;

    /// Entry mapping `va`, if its table exists.
    fn entry_mut(&mut self, va: usize) -> Option<&mut PageTableEntry> {
        self.table_mut(pdx(va)).map(|table| &mut table[ptx(va)])
    }
}
