//! Second-chance victim selection.
//!
//! The sweep visits user mappings in address order. A mapping with its
//! reference bit set loses the bit and is passed over; the first mapping
//! found with the bit already clear is evicted. Every call starts again at
//! the first directory entry; no clock hand survives between calls.

use super::page_table::{page_address, PageTableEntry, PageTableWalk};
use super::PhysFrame;
use crate::config::NPDENTRIES;

/// A page detached from its address space by [`select_victim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Victim {
    /// Virtual address of the evicted page.
    pub va: usize,
    /// Frame that backed it. The caller now owns it.
    pub frame: PhysFrame,
}

/// Pick and detach one resident user page of `space`.
///
/// The chosen entry is overwritten with the swapped-out tag, so a later
/// access faults and can be recognised as needing a restore. Returns `None`
/// only when `space` maps no present user page at all.
pub fn select_victim<S: PageTableWalk + ?Sized>(space: &mut S) -> Option<Victim> {
    // After one full pass every reference bit is clear, so the second pass
    // takes the first resident page it meets.
    for _ in 0..2 {
        let mut resident = false;

        for pdx in 0..NPDENTRIES {
            let Some(table) = space.table_mut(pdx) else {
                continue;
            };
            for (ptx, entry) in table.iter_mut().enumerate() {
                if !entry.is_present() || !entry.is_user() {
                    continue;
                }
                resident = true;

                if entry.is_accessed() {
                    entry.clear_accessed();
                    continue;
                }

                let frame = entry.frame();
                *entry = PageTableEntry::swapped_out();
                return Some(Victim {
                    va: page_address(pdx, ptx),
                    frame,
                });
            }
        }

        if !resident {
            return None;
        }
    }
    None
}

/// Does `space` map at least one present user page?
pub fn has_resident_page<S: PageTableWalk + ?Sized>(space: &mut S) -> bool {
    (0..NPDENTRIES).any(|pdx| {
        space
            .table_mut(pdx)
            .is_some_and(|table| table.iter().any(|e| e.is_present() && e.is_user()))
    })
}
