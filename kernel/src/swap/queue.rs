//! Bounded swap request queues.
//!
//! A ring of process slots with one cell left empty, so `head == tail`
//! means empty and `head == tail + 1` means full. Each ring also carries
//! the flag saying whether its worker is alive; both live under the same
//! lock, so a producer can never see an active worker that has already
//! decided to stop.

use super::{Direction, SwapError};
use crate::config::NPROC;
use crate::sync::{SpinLock, SpinLockGuard};

/// Ring of pending requests plus the worker flag.
#[derive(Debug)]
pub struct RequestRing {
    entries: [usize; NPROC],
    /// Next entry to dequeue.
    head: usize,
    /// Next free cell.
    tail: usize,
    worker_active: bool,
}

impl RequestRing {
    pub const fn new() -> Self {
        RequestRing {
            entries: [0; NPROC],
            head: 0,
            tail: 0,
            worker_active: false,
        }
    }

    pub fn len(&self) -> usize {
        (self.tail + NPROC - self.head) % NPROC
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.head == (self.tail + 1) % NPROC
    }

    /// Append `slot`; a full ring is left untouched.
    pub fn push(&mut self, slot: usize) -> Result<(), SwapError> {
        if self.is_full() {
            return Err(SwapError::QueueFull);
        }
        self.entries[self.tail] = slot;
        self.tail = (self.tail + 1) % NPROC;
        Ok(())
    }

    /// Take back the entry pushed last.
    pub(crate) fn pop_newest(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        self.tail = (self.tail + NPROC - 1) % NPROC;
        Some(self.entries[self.tail])
    }

    /// Remove the oldest entry.
    pub fn pop(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let slot = self.entries[self.head];
        self.head = (self.head + 1) % NPROC;
        Some(slot)
    }

    pub fn worker_active(&self) -> bool {
        self.worker_active
    }

    pub(crate) fn set_worker_active(&mut self, active: bool) {
        self.worker_active = active;
    }
}

impl Default for RequestRing {
    fn default() -> Self {
        Self::new()
    }
}

/// One direction's queue.
pub struct SwapQueue {
    direction: Direction,
    ring: SpinLock<RequestRing>,
}

impl SwapQueue {
    pub const fn new(direction: Direction) -> Self {
        let name = match direction {
            Direction::Evict => "evict_queue",
            Direction::Restore => "restore_queue",
        };
        SwapQueue {
            direction,
            ring: SpinLock::new(name, RequestRing::new()),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Queue a request for the process in `slot`. A full queue drops the
    /// request and reports [`SwapError::QueueFull`].
    pub fn enqueue(&self, slot: usize) -> Result<(), SwapError> {
        self.push_locked(&mut self.ring.lock(), slot)
    }

    /// [`SwapQueue::enqueue`] for a caller already holding the ring.
    pub(crate) fn push_locked(&self, ring: &mut RequestRing, slot: usize) -> Result<(), SwapError> {
        ring.push(slot).inspect_err(|_| {
            log::warn!("[SWAP] {:?} queue full, dropping slot {}", self.direction, slot);
        })
    }

    /// Take the oldest request, if any.
    pub fn dequeue(&self) -> Option<usize> {
        self.ring.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Is a worker draining this queue?
    pub fn worker_active(&self) -> bool {
        self.ring.lock().worker_active()
    }

    pub(crate) fn lock(&self) -> SpinLockGuard<'_, RequestRing> {
        self.ring.lock()
    }
}
