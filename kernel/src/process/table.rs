//! Process Table
//!
//! Fixed-capacity registry of process records. A record has two halves:
//!
//! - the scheduling half ([`Registry`]): state, pid, parent, sleep channel,
//!   kill flag and name of every slot, all behind one spinlock;
//! - the private half ([`ProcData`]): kernel stack, address space, saved
//!   context, trap frame, open files and working directory, owned by
//!   whoever the state machine says owns the record.

use core::cell::UnsafeCell;
use core::fmt;
use core::ptr;

use super::context::TrapFrame;
use crate::config::{NOFILE, NPROC, PROC_NAME_LEN};
use crate::kernel::{FileOf, InodeOf, Platform, SpaceOf};
use crate::memory::KernelStack;
use crate::scheduler::Context;
use crate::sync::{Channel, SpinLock, SpinLockGuard};

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pid(pub u32);

impl Pid {
    /// Placeholder carried by unused slots.
    pub const NONE: Pid = Pid(0);

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Free slot
    Unused,
    /// Slot claimed, not yet runnable
    Embryo,
    /// Waiting for a CPU
    Runnable,
    /// On a CPU
    Running,
    /// Blocked on a channel
    Sleeping,
    /// Exited, waiting for the parent to collect it
    Zombie,
}

impl ProcState {
    /// Is `self -> next` an edge of the lifecycle?
    ///
    /// `Embryo -> Unused` rolls back a failed creation and
    /// `Running -> Unused` is a swap worker retiring itself.
    pub fn can_become(self, next: ProcState) -> bool {
        use ProcState::*;
        matches!(
            (self, next),
            (Unused, Embryo)
                | (Embryo, Unused)
                | (Embryo, Runnable)
                | (Runnable, Running)
                | (Running, Runnable)
                | (Running, Sleeping)
                | (Running, Zombie)
                | (Running, Unused)
                | (Sleeping, Runnable)
                | (Zombie, Unused)
        )
    }

    /// Fixed-width label for diagnostic dumps.
    pub fn label(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }
}

/// Process name, truncated to fit a fixed buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProcName {
    bytes: [u8; PROC_NAME_LEN],
    len: u8,
}

impl ProcName {
    /// The empty name.
    pub const EMPTY: ProcName = ProcName {
        bytes: [0; PROC_NAME_LEN],
        len: 0,
    };

    /// Copy `name`, keeping at most `PROC_NAME_LEN - 1` bytes and never
    /// splitting a character.
    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(PROC_NAME_LEN - 1);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0; PROC_NAME_LEN];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        ProcName {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("?")
    }
}

impl fmt::Debug for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling half of one record.
#[derive(Debug, Clone, Copy)]
struct Slot {
    pid: Pid,
    state: ProcState,
    /// Slot of the parent record; a lookup key, not ownership.
    parent: Option<usize>,
    channel: Option<Channel>,
    killed: bool,
    /// A swap request for this record is queued or being served.
    swap_pending: bool,
    name: ProcName,
}

impl Slot {
    const UNUSED: Slot = Slot {
        pid: Pid::NONE,
        state: ProcState::Unused,
        parent: None,
        channel: None,
        killed: false,
        swap_pending: false,
        name: ProcName::EMPTY,
    };
}

/// Scheduling state of every record. Only reachable through the registry
/// lock, and only changed through the transitions below.
pub struct Registry {
    slots: [Slot; NPROC],
    next_pid: u32,
}

/// Proof of holding the registry lock.
pub type RegistryGuard<'a> = SpinLockGuard<'a, Registry>;

impl Registry {
    const fn new() -> Self {
        Registry {
            slots: [Slot::UNUSED; NPROC],
            next_pid: 1,
        }
    }

    pub fn state(&self, slot: usize) -> ProcState {
        self.slots[slot].state
    }

    pub fn pid(&self, slot: usize) -> Pid {
        self.slots[slot].pid
    }

    pub fn parent(&self, slot: usize) -> Option<usize> {
        self.slots[slot].parent
    }

    pub fn channel(&self, slot: usize) -> Option<Channel> {
        self.slots[slot].channel
    }

    pub fn killed(&self, slot: usize) -> bool {
        self.slots[slot].killed
    }

    pub fn name(&self, slot: usize) -> ProcName {
        self.slots[slot].name
    }

    pub fn swap_pending(&self, slot: usize) -> bool {
        self.slots[slot].swap_pending
    }

    /// Slot of the live record with `pid`.
    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state != ProcState::Unused && s.pid == pid)
    }

    /// Slots whose parent is `parent`.
    pub fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.parent == Some(parent))
            .map(|(slot, _)| slot)
    }

    /// Number of records in `state`.
    pub fn count(&self, state: ProcState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    fn transition(&mut self, slot: usize, next: ProcState) {
        let current = self.slots[slot].state;
        if !current.can_become(next) {
            log::error!("[PROC] slot {}: illegal transition {:?} -> {:?}", slot, current, next);
            panic!("proc: illegal transition {:?} -> {:?}", current, next);
        }
        self.slots[slot].state = next;
    }

    /// Claim the first unused slot as an embryo with a fresh pid.
    pub(crate) fn claim(&mut self) -> Option<(usize, Pid)> {
        let slot = self.slots.iter().position(|s| s.state == ProcState::Unused)?;
        self.transition(slot, ProcState::Embryo);

        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        let record = &mut self.slots[slot];
        record.pid = pid;
        record.parent = None;
        record.channel = None;
        record.killed = false;
        record.swap_pending = false;
        record.name = ProcName::EMPTY;
        Some((slot, pid))
    }

    /// Give back an embryo whose creation failed.
    pub(crate) fn abandon(&mut self, slot: usize) {
        self.transition(slot, ProcState::Unused);
        self.slots[slot] = Slot::UNUSED;
    }

    pub(crate) fn set_runnable(&mut self, slot: usize) {
        self.transition(slot, ProcState::Runnable);
    }

    pub(crate) fn set_running(&mut self, slot: usize) {
        self.transition(slot, ProcState::Running);
    }

    pub(crate) fn set_parent(&mut self, slot: usize, parent: Option<usize>) {
        self.slots[slot].parent = parent;
    }

    pub(crate) fn set_name(&mut self, slot: usize, name: &str) {
        self.slots[slot].name = ProcName::new(name);
    }

    pub(crate) fn set_swap_pending(&mut self, slot: usize, pending: bool) {
        self.slots[slot].swap_pending = pending;
    }

    /// Block the running record `slot` on `channel`.
    pub(crate) fn sleep_on(&mut self, slot: usize, channel: Channel) {
        self.transition(slot, ProcState::Sleeping);
        self.slots[slot].channel = Some(channel);
    }

    pub(crate) fn clear_channel(&mut self, slot: usize) {
        self.slots[slot].channel = None;
    }

    /// Make every record sleeping on `channel` runnable. Returns how many.
    pub(crate) fn wake_channel(&mut self, channel: Channel) -> usize {
        let mut woken = 0;
        for slot in 0..NPROC {
            let record = &self.slots[slot];
            if record.state == ProcState::Sleeping && record.channel == Some(channel) {
                self.transition(slot, ProcState::Runnable);
                woken += 1;
            }
        }
        woken
    }

    /// Flag the record with `pid` for termination, waking it if asleep.
    /// The sleep channel is left for the sleeper to clear.
    pub(crate) fn kill(&mut self, pid: Pid) -> Option<usize> {
        let slot = self.find(pid)?;
        self.slots[slot].killed = true;
        if self.slots[slot].state == ProcState::Sleeping {
            self.transition(slot, ProcState::Runnable);
        }
        Some(slot)
    }

    pub(crate) fn set_zombie(&mut self, slot: usize) {
        self.transition(slot, ProcState::Zombie);
    }

    /// Collect a zombie, returning its pid and freeing the slot.
    pub(crate) fn reap(&mut self, slot: usize) -> Pid {
        let pid = self.slots[slot].pid;
        self.transition(slot, ProcState::Unused);
        self.slots[slot] = Slot::UNUSED;
        pid
    }

    /// Turn a running kernel process back into a free slot.
    pub(crate) fn retire(&mut self, slot: usize) {
        self.transition(slot, ProcState::Unused);
        self.slots[slot] = Slot {
            name: ProcName::new("*"),
            ..Slot::UNUSED
        };
    }
}

/// Private half of one record.
///
/// Nobody locks this. Ownership follows the state machine:
///
/// - an embryo belongs to the code that claimed it;
/// - a runnable, running or sleeping record belongs to the process itself,
///   except that the scheduler reads the address space and kernel stack
///   while dispatching it under the registry lock;
/// - while a swap request is pending, its address space belongs to the
///   swap worker serving the request and the process is asleep;
/// - a zombie or retired record belongs to whoever holds the registry lock.
pub struct ProcData<P: Platform> {
    pub kstack: Option<KernelStack>,
    pub space: Option<SpaceOf<P>>,
    pub context: Context,
    pub trap_frame: TrapFrame,
    pub files: [Option<FileOf<P>>; NOFILE],
    pub cwd: Option<InodeOf<P>>,
    /// Size of the user address space in bytes.
    pub size: usize,
    /// Faulting address of a pending restore.
    pub fault_addr: usize,
}

impl<P: Platform> ProcData<P> {
    fn new() -> Self {
        ProcData {
            kstack: None,
            space: None,
            context: Context::default(),
            trap_frame: TrapFrame::default(),
            files: core::array::from_fn(|_| None),
            cwd: None,
            size: 0,
            fault_addr: 0,
        }
    }
}

/// The registry and the private halves of all records.
pub struct ProcTable<P: Platform> {
    registry: SpinLock<Registry>,
    data: [UnsafeCell<ProcData<P>>; NPROC],
}

// SAFETY: the registry is a lock; access to `data` follows the ownership
// rules on `ProcData`.
unsafe impl<P: Platform> Sync for ProcTable<P> {}
unsafe impl<P: Platform> Send for ProcTable<P> {}

impl<P: Platform> ProcTable<P> {
    pub fn new() -> Self {
        ProcTable {
            registry: SpinLock::new("ptable", Registry::new()),
            data: core::array::from_fn(|_| UnsafeCell::new(ProcData::new())),
        }
    }

    /// Acquire the registry lock.
    pub fn lock(&self) -> RegistryGuard<'_> {
        self.registry.lock()
    }

    pub(crate) fn registry(&self) -> &SpinLock<Registry> {
        &self.registry
    }

    /// Private half of `slot`.
    ///
    /// # Safety
    ///
    /// The caller must own the record under the rules on [`ProcData`] and
    /// must not hold another reference to the same slot's data.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data(&self, slot: usize) -> &mut ProcData<P> {
        // SAFETY: guaranteed by the caller.
        unsafe { &mut *self.data[slot].get() }
    }

    /// Saved context of `slot`, for the switch routine.
    pub(crate) fn context_ptr(&self, slot: usize) -> *mut Context {
        // SAFETY: only forms a raw pointer; nothing is read.
        unsafe { ptr::addr_of_mut!((*self.data[slot].get()).context) }
    }
}

impl<P: Platform> Default for ProcTable<P> {
    fn default() -> Self {
        Self::new()
    }
}
