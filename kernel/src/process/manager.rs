//! Process Manager
//!
//! Creation, duplication, termination and collection of processes, plus
//! the per-process descriptor table.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use super::context::TrapFrame;
use super::table::{Pid, ProcData, ProcName, ProcState};
use crate::arch;
use crate::config::{INIT_NAME, NPROC, PAGE_SIZE, ROOT_PATH};
use crate::kernel::{FileOf, Kernel, Platform};
use crate::memory::{KernelStack, Memory};
use crate::sync::Channel;
use crate::vfs::{FileSystem, Transaction};

/// Process operation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// Every slot of the process table is in use
    OutOfSlots,
    /// Memory allocation failed
    OutOfMemory,
    /// No process with that pid
    NotFound,
    /// Nothing to wait for
    NoChildren,
    /// Invalid argument
    InvalidArgument,
    /// Descriptor table full
    TooManyFiles,
    /// Descriptor not open
    BadDescriptor,
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcError::OutOfSlots => write!(f, "process table full"),
            ProcError::OutOfMemory => write!(f, "out of memory"),
            ProcError::NotFound => write!(f, "no such process"),
            ProcError::NoChildren => write!(f, "no children"),
            ProcError::InvalidArgument => write!(f, "invalid argument"),
            ProcError::TooManyFiles => write!(f, "too many open files"),
            ProcError::BadDescriptor => write!(f, "bad file descriptor"),
        }
    }
}

/// Where a new record starts executing.
pub(crate) enum Entry<P: Platform> {
    /// Return to user mode through its trap frame.
    User,
    /// Run a kernel function on the record's kernel stack.
    Kernel(fn(&'static Kernel<P>) -> !),
}

/// One line of [`Kernel::dump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcSnapshot {
    pub slot: usize,
    pub pid: Pid,
    pub state: ProcState,
    pub name: ProcName,
}

impl<P: Platform> Kernel<P> {
    /// Claim a slot and give it a kernel stack and a context that starts at
    /// `entry`.
    pub(crate) fn allocate(&'static self, entry: Entry<P>) -> Result<(usize, Pid), ProcError> {
        let (slot, pid) = self.procs.lock().claim().ok_or(ProcError::OutOfSlots)?;

        let Some(frame) = self.memory().alloc_frame() else {
            self.procs.lock().abandon(slot);
            return Err(ProcError::OutOfMemory);
        };
        let stack = KernelStack::new(frame);

        let start: Box<dyn FnOnce() + Send> = match entry {
            Entry::User => Box::new(move || {
                self.fork_return();
                // SAFETY: this closure runs as the process in `slot`.
                let frame = unsafe { self.procs.data(slot) }.trap_frame;
                arch::arch().enter_user(&frame);
            }),
            Entry::Kernel(main) => Box::new(move || {
                self.fork_return();
                main(self);
            }),
        };

        // SAFETY: the slot is an embryo we just claimed.
        let data = unsafe { self.procs.data(slot) };
        data.context = arch::arch().new_context(&stack, start);
        data.kstack = Some(stack);
        data.trap_frame = TrapFrame::default();
        data.size = 0;
        data.fault_addr = 0;
        Ok((slot, pid))
    }

    /// Undo a creation that failed after `allocate`.
    fn discard_embryo(&self, slot: usize, data: &mut ProcData<P>) {
        if let Some(space) = data.space.take() {
            self.memory().free_vm(space);
        }
        if let Some(stack) = data.kstack.take() {
            self.memory().free_frame(stack.frame());
        }
        self.procs.lock().abandon(slot);
    }

    /// Create the first user process running `image`.
    pub fn userinit(&'static self, image: &[u8]) -> Result<Pid, ProcError> {
        let (slot, pid) = self.allocate(Entry::User)?;
        // SAFETY: our embryo.
        let data = unsafe { self.procs.data(slot) };

        let Some(mut space) = self.memory().setup_kvm() else {
            self.discard_embryo(slot, data);
            return Err(ProcError::OutOfMemory);
        };
        if let Err(err) = self.memory().init_uvm(&mut space, image) {
            log::error!("[PROC] userinit: cannot load init image: {}", err);
            self.memory().free_vm(space);
            self.discard_embryo(slot, data);
            return Err(ProcError::OutOfMemory);
        }
        data.space = Some(space);
        data.size = PAGE_SIZE;
        data.trap_frame = TrapFrame::user_entry(0, PAGE_SIZE as u32);
        data.cwd = match self.fs().namei(ROOT_PATH) {
            Some(root) => Some(root),
            None => panic!("userinit: no root directory"),
        };

        let mut reg = self.procs.lock();
        reg.set_name(slot, INIT_NAME);
        reg.set_runnable(slot);
        self.set_init_slot(slot);
        drop(reg);

        log::info!("[PROC] init process created (pid {})", pid);
        Ok(pid)
    }

    /// Duplicate the current process. Returns the child's pid; the child
    /// sees zero.
    pub fn fork(&'static self) -> Result<Pid, ProcError> {
        let parent = self.current_slot("fork");
        let (child, pid) = self.allocate(Entry::User)?;

        // SAFETY: `parent` is the caller's own record, `child` our embryo.
        let (src, dst) = unsafe { (self.procs.data(parent), self.procs.data(child)) };

        let copy = src
            .space
            .as_ref()
            .and_then(|space| self.memory().copy_uvm(space, src.size));
        let Some(space) = copy else {
            self.discard_embryo(child, dst);
            return Err(ProcError::OutOfMemory);
        };
        dst.space = Some(space);
        dst.size = src.size;
        dst.trap_frame = src.trap_frame;
        dst.trap_frame.set_return_value(0);

        for (to, from) in dst.files.iter_mut().zip(src.files.iter()) {
            *to = from.as_ref().map(|file| self.fs().dup(file));
        }
        dst.cwd = src.cwd.as_ref().map(|cwd| self.fs().idup(cwd));

        let mut reg = self.procs.lock();
        let name = reg.name(parent);
        reg.set_name(child, name.as_str());
        reg.set_parent(child, Some(parent));
        reg.set_runnable(child);
        let parent_pid = reg.pid(parent);
        drop(reg);

        log::debug!("[PROC] fork: pid {} -> pid {}", parent_pid, pid);
        Ok(pid)
    }

    /// Terminate the current process. It stays a zombie until its parent
    /// collects it with [`Kernel::wait`].
    pub fn exit(&self) -> ! {
        let slot = self.current_slot("exit");
        let init = self.init_slot();
        if Some(slot) == init {
            log::error!("[PROC] init tried to exit");
            panic!("init exiting");
        }

        // SAFETY: our own record.
        let data = unsafe { self.procs.data(slot) };
        for file in data.files.iter_mut() {
            if let Some(file) = file.take() {
                self.fs().close(file);
            }
        }
        if let Some(cwd) = data.cwd.take() {
            let _op = Transaction::begin(self.fs());
            self.fs().iput(cwd);
        }

        let mut reg = self.procs.lock();

        // The parent might be sleeping in wait().
        if let Some(parent) = reg.parent(slot) {
            Self::wakeup_locked(&mut reg, Channel::Proc(parent));
        }

        // Pass abandoned children to init.
        for child in 0..NPROC {
            if reg.parent(child) != Some(slot) {
                continue;
            }
            reg.set_parent(child, init);
            if reg.state(child) == ProcState::Zombie {
                if let Some(init) = init {
                    Self::wakeup_locked(&mut reg, Channel::Proc(init));
                }
            }
        }

        log::debug!("[PROC] pid {} exited", reg.pid(slot));
        reg.set_zombie(slot);
        let _reg = self.sched(reg);
        panic!("zombie exit");
    }

    /// Wait for a child to exit and return its pid.
    ///
    /// Fails with [`ProcError::NoChildren`] when the caller has no children,
    /// or has been killed and none has exited yet.
    pub fn wait(&self) -> Result<Pid, ProcError> {
        let slot = self.current_slot("wait");
        let mut reg = self.procs.lock();

        loop {
            let mut have_kids = false;
            for child in 0..NPROC {
                if reg.parent(child) != Some(slot) {
                    continue;
                }
                have_kids = true;
                if reg.state(child) != ProcState::Zombie {
                    continue;
                }

                // SAFETY: a zombie never runs again, and we hold the
                // registry lock.
                let data = unsafe { self.procs.data(child) };
                if let Some(stack) = data.kstack.take() {
                    self.memory().free_frame(stack.frame());
                }
                if let Some(space) = data.space.take() {
                    self.memory().free_vm(space);
                }
                data.size = 0;
                let pid = reg.reap(child);
                return Ok(pid);
            }

            if !have_kids || reg.killed(slot) {
                return Err(ProcError::NoChildren);
            }

            // exit() wakes this channel.
            reg = self.sleep_registry(Channel::Proc(slot), reg);
        }
    }

    /// Ask the process `pid` to terminate. It notices the next time it
    /// checks [`Kernel::killed`], and a sleeping target is woken for that.
    pub fn kill(&self, pid: Pid) -> Result<(), ProcError> {
        let slot = self.procs.lock().kill(pid).ok_or(ProcError::NotFound)?;
        log::debug!("[PROC] kill pid {} (slot {})", pid, slot);
        Ok(())
    }

    /// Has the current process been killed?
    pub fn killed(&self) -> bool {
        let slot = self.current_slot("killed");
        self.procs.lock().killed(slot)
    }

    /// State of the process `pid`, if it exists.
    pub fn state_of(&self, pid: Pid) -> Option<ProcState> {
        let reg = self.procs.lock();
        reg.find(pid).map(|slot| reg.state(slot))
    }

    /// Grow or shrink the current process's memory by `delta` bytes.
    /// Returns the previous size.
    pub fn grow_memory(&self, delta: isize) -> Result<usize, ProcError> {
        let slot = self.current_slot("grow_memory");
        // SAFETY: our own record.
        let data = unsafe { self.procs.data(slot) };
        let (Some(space), Some(stack)) = (data.space.as_mut(), data.kstack.as_ref()) else {
            panic!("grow_memory: process without address space");
        };

        let old = data.size;
        let new = if delta > 0 {
            let target = old.checked_add(delta.unsigned_abs()).ok_or(ProcError::InvalidArgument)?;
            self.memory()
                .alloc_uvm(space, old, target)
                .ok_or(ProcError::OutOfMemory)?
        } else if delta < 0 {
            let target = old.checked_sub(delta.unsigned_abs()).ok_or(ProcError::InvalidArgument)?;
            self.memory().dealloc_uvm(space, old, target)
        } else {
            old
        };

        data.size = new;
        self.memory().switch_uvm(space, stack);
        Ok(old)
    }

    /// Memory size of the current process.
    pub fn memory_size(&self) -> usize {
        let slot = self.current_slot("memory_size");
        // SAFETY: our own record.
        unsafe { self.procs.data(slot) }.size
    }

    /// Start a process that runs `entry` in kernel mode.
    pub fn create_kernel_process(
        &'static self,
        name: &str,
        entry: fn(&'static Kernel<P>) -> !,
    ) -> Result<Pid, ProcError> {
        let (slot, pid) = self.allocate(Entry::Kernel(entry))?;
        // SAFETY: our embryo.
        let data = unsafe { self.procs.data(slot) };

        let Some(space) = self.memory().setup_kvm() else {
            self.discard_embryo(slot, data);
            return Err(ProcError::OutOfMemory);
        };
        data.space = Some(space);

        let mut reg = self.procs.lock();
        reg.set_name(slot, name);
        reg.set_runnable(slot);
        drop(reg);

        log::info!("[PROC] kernel process {} started (pid {})", name, pid);
        Ok(pid)
    }

    /// Run `f` on the current process's trap frame.
    pub fn with_trap_frame<R>(&self, f: impl FnOnce(&mut TrapFrame) -> R) -> R {
        let slot = self.current_slot("with_trap_frame");
        // SAFETY: our own record.
        f(&mut unsafe { self.procs.data(slot) }.trap_frame)
    }

    /// Install `file` in the lowest free descriptor of the current process.
    ///
    /// With every descriptor taken the file is closed and
    /// [`ProcError::TooManyFiles`] returned.
    pub fn fd_alloc(&self, file: FileOf<P>) -> Result<usize, ProcError> {
        let slot = self.current_slot("fd_alloc");
        // SAFETY: our own record.
        let data = unsafe { self.procs.data(slot) };
        match data.files.iter().position(Option::is_none) {
            Some(fd) => {
                data.files[fd] = Some(file);
                Ok(fd)
            }
            None => {
                self.fs().close(file);
                Err(ProcError::TooManyFiles)
            }
        }
    }

    /// Run `f` on the file open at `fd`.
    pub fn with_fd<R>(&self, fd: usize, f: impl FnOnce(&mut FileOf<P>) -> R) -> Result<R, ProcError> {
        let slot = self.current_slot("with_fd");
        // SAFETY: our own record.
        let data = unsafe { self.procs.data(slot) };
        let file = data
            .files
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(ProcError::BadDescriptor)?;
        Ok(f(file))
    }

    /// Close descriptor `fd` of the current process.
    pub fn fd_close(&self, fd: usize) -> Result<(), ProcError> {
        let slot = self.current_slot("fd_close");
        // SAFETY: our own record.
        let data = unsafe { self.procs.data(slot) };
        let file = data
            .files
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(ProcError::BadDescriptor)?;
        self.fs().close(file);
        Ok(())
    }

    /// Print every live record. Takes no locks, so it works on a wedged
    /// kernel, at the price of possibly inconsistent output.
    pub fn dump(&self) -> Vec<ProcSnapshot> {
        // SAFETY: a racy read is acceptable here.
        let reg = unsafe { self.procs.registry().get_unchecked() };

        let mut snapshot = Vec::new();
        for slot in 0..NPROC {
            let state = reg.state(slot);
            if state == ProcState::Unused {
                continue;
            }
            let line = ProcSnapshot {
                slot,
                pid: reg.pid(slot),
                state,
                name: reg.name(slot),
            };
            log::info!("{} {} {}", line.pid, state.label(), line.name);
            snapshot.push(line);
        }
        snapshot
    }
}
