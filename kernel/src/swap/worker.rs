//! Swap workers and the requests that start them.

use core::convert::identity;
use core::fmt::Display;

use super::store::{swap_file_name, SwapStore};
use super::{Direction, SwapError};
use crate::kernel::{Kernel, Platform};
use crate::memory::page_table::page_round_down;
use crate::memory::{has_resident_page, select_victim, Memory, PageTableWalk, PteFlags};
use crate::process::ProcError;
use crate::sync::Channel;

/// Worker failures leave a page half moved; there is no way back.
fn fatal(what: &str, err: impl Display) -> ! {
    log::error!("[SWAP] {}: {}", what, err);
    panic!("swap: {}: {}", what, err);
}

fn swap_out_main<P: Platform>(kernel: &'static Kernel<P>) -> ! {
    kernel.drain(Direction::Evict)
}

fn swap_in_main<P: Platform>(kernel: &'static Kernel<P>) -> ! {
    kernel.drain(Direction::Restore)
}

impl<P: Platform> Kernel<P> {
    /// Evict one resident page of the current process to its swap file.
    ///
    /// Blocks until the page is written out and its frame freed.
    pub fn request_swap_out(&'static self) -> Result<(), SwapError> {
        let slot = self.current_slot("request_swap_out");
        // SAFETY: our own record.
        let resident = unsafe { self.procs.data(slot) }
            .space
            .as_mut()
            .is_some_and(|space| has_resident_page(space));
        if !resident {
            return Err(SwapError::NoResidentPage);
        }
        self.submit(Direction::Evict, slot, None)
    }

    /// Bring back the swapped-out page containing `va` for the current
    /// process. Called by the trap layer on a page fault.
    ///
    /// Blocks until the page is mapped again.
    pub fn handle_swap_fault(&'static self, va: usize) -> Result<(), SwapError> {
        let slot = self.current_slot("handle_swap_fault");
        // SAFETY: our own record.
        let swapped = unsafe { self.procs.data(slot) }
            .space
            .as_mut()
            .and_then(|space| space.entry_mut(va))
            .is_some_and(|entry| entry.is_swapped());
        if !swapped {
            return Err(SwapError::NotSwapped);
        }
        self.submit(Direction::Restore, slot, Some(va))
    }

    /// Start a worker for `direction` unless one is already draining.
    pub fn ensure_swap_worker(&'static self, direction: Direction) -> Result<(), SwapError> {
        let mut ring = self.swap_queue(direction).lock();
        if !ring.worker_active() {
            self.spawn_worker(direction)?;
            ring.set_worker_active(true);
        }
        Ok(())
    }

    fn spawn_worker(&'static self, direction: Direction) -> Result<(), ProcError> {
        let entry: fn(&'static Kernel<P>) -> ! = match direction {
            Direction::Evict => swap_out_main::<P>,
            Direction::Restore => swap_in_main::<P>,
        };
        self.create_kernel_process(direction.worker_name(), entry)?;
        Ok(())
    }

    /// Queue `slot` for `direction` and sleep until a worker has served it.
    ///
    /// `fault_addr` is stored on the record only once the request is queued;
    /// a refused request leaves the record as it was.
    fn submit(
        &'static self,
        direction: Direction,
        slot: usize,
        fault_addr: Option<usize>,
    ) -> Result<(), SwapError> {
        let queue = self.swap_queue(direction);
        let mut ring = queue.lock();
        queue.push_locked(&mut ring, slot)?;
        // The flag and the queue share a lock: a worker that is still marked
        // active has not yet looked at the queue for the last time.
        if !ring.worker_active() {
            if let Err(err) = self.spawn_worker(direction) {
                ring.pop_newest();
                log::warn!("[SWAP] no {} worker for slot {}: {}", direction.worker_name(), slot, err);
                return Err(err.into());
            }
            ring.set_worker_active(true);
        }
        if let Some(va) = fault_addr {
            // SAFETY: our own record; the worker reads it only after taking
            // the ring lock we still hold.
            unsafe { self.procs.data(slot) }.fault_addr = va;
        }
        self.procs.lock().set_swap_pending(slot, true);
        drop(ring);

        let mut reg = self.procs.lock();
        while reg.swap_pending(slot) {
            reg = self.sleep_registry(Channel::Swap(slot), reg);
        }
        Ok(())
    }

    /// Serve every queued request, then retire.
    fn drain(&'static self, direction: Direction) -> ! {
        let mut ring = self.swap_queue(direction).lock();
        while let Some(slot) = ring.pop() {
            match direction {
                Direction::Evict => self.swap_out(slot),
                Direction::Restore => self.swap_in(slot),
            }
            self.stats.record(direction);

            let mut reg = self.procs.lock();
            reg.set_swap_pending(slot, false);
            Self::wakeup_locked(&mut reg, Channel::Swap(slot));
        }
        ring.set_worker_active(false);
        drop(ring);

        self.retire()
    }

    /// Write one victim page of `slot` to its swap file.
    fn swap_out(&self, slot: usize) {
        let pid = self.procs.lock().pid(slot);
        // SAFETY: the requester sleeps until its request is served, so its
        // address space is ours until then.
        let data = unsafe { self.procs.data(slot) };
        let Some(space) = data.space.as_mut() else {
            fatal("swap-out", "process has no address space");
        };
        let Some(victim) = select_victim(space) else {
            fatal("swap-out", "no resident page");
        };

        let name = swap_file_name(pid, victim.va);
        let store = SwapStore::new(self.fs());
        let file = store.create(&name).unwrap_or_else(|err| fatal("swap-out create", err));
        let fd = self.fd_alloc(file).unwrap_or_else(|err| fatal("swap-out descriptor", err));

        let written = self
            .with_fd(fd, |file| {
                self.memory()
                    .with_frame(victim.frame, |page| store.write_page(file, page))
            })
            .map_err(SwapError::Worker)
            .and_then(identity);
        if let Err(err) = written {
            fatal("swap-out write", err);
        }
        if let Err(err) = self.fd_close(fd) {
            fatal("swap-out close", err);
        }

        self.memory().free_frame(victim.frame);
        log::debug!("[SWAP] pid {} page {:#x} -> {}", pid, victim.va, name);
    }

    /// Read the page `slot` faulted on back from its swap file.
    fn swap_in(&self, slot: usize) {
        let pid = self.procs.lock().pid(slot);
        // SAFETY: as for swap_out.
        let data = unsafe { self.procs.data(slot) };
        let va = page_round_down(data.fault_addr);

        let name = swap_file_name(pid, va);
        let store = SwapStore::new(self.fs());
        let file = store.open(&name).unwrap_or_else(|err| fatal("swap-in open", err));
        let fd = self.fd_alloc(file).unwrap_or_else(|err| fatal("swap-in descriptor", err));

        let Some(frame) = self.memory().alloc_frame() else {
            fatal("swap-in", ProcError::OutOfMemory);
        };
        let read = self
            .with_fd(fd, |file| {
                self.memory()
                    .with_frame(frame, |page| store.read_page(file, page))
            })
            .map_err(SwapError::Worker)
            .and_then(identity);
        if let Err(err) = read {
            fatal("swap-in read", err);
        }
        if let Err(err) = self.fd_close(fd) {
            fatal("swap-in close", err);
        }

        let Some(space) = data.space.as_mut() else {
            fatal("swap-in", "process has no address space");
        };
        if let Err(err) = self
            .memory()
            .map_page(space, va, frame, PteFlags::WRITABLE | PteFlags::USER)
        {
            fatal("swap-in map", SwapError::Map(err));
        }
        log::debug!("[SWAP] pid {} page {:#x} <- {}", pid, va, name);
    }

    /// Hand the worker's slot back and never run again. The scheduler frees
    /// the stack and address space once it is off this stack.
    fn retire(&self) -> ! {
        let slot = self.current_slot("retire");
        let mut reg = self.procs.lock();
        log::debug!("[SWAP] {} (pid {}) retiring", reg.name(slot), reg.pid(slot));
        reg.retire(slot);
        let _reg = self.sched(reg);
        panic!("retired swap worker resumed");
    }
}
