//! Swap Unit Tests
//!
//! Tests for eviction and restore through the worker processes.

#[cfg(test)]
mod tests {
    use std::time::Instant;
    use std::vec::Vec;

    use crate::config::{PAGE_SIZE, SWAP_IN_WORKER, SWAP_OUT_WORKER};
    use crate::process::{Pid, ProcError};
    use crate::swap::{swap_file_name, Direction, SwapError};
    use crate::tests::sim::{self, Machine, SimKernel, TIMEOUT};

    /// Poll until `done` holds or the deadline passes.
    fn eventually(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::yield_now();
        }
        done()
    }

    /// Records in the process table named `name`.
    fn count_named(k: &SimKernel, name: &str) -> usize {
        k.dump().iter().filter(|p| p.name.as_str() == name).count()
    }

    // ========================================
    // Round Trip
    // ========================================

    #[test]
    fn test_page_survives_eviction_and_restore() {
        let machine = Machine::new();
        let (report, results) = sim::report();

        let init = machine.boot(2, move |k| {
            k.grow_memory(PAGE_SIZE as isize).unwrap();
            sim::fill_page(k, 0x1000, 0xAB);
            // Page 0 gets its second chance; 0x1000 goes.
            sim::touch(k, 0);

            let evicted = k.request_swap_out();
            let entry = sim::user_entry(k, 0x1000).unwrap();
            let zero_resident = sim::read_page(k, 0).is_some();

            let restored = k.handle_swap_fault(0x1000 + 0x10);
            let page = sim::read_page(k, 0x1000);
            report.send((evicted, entry.is_swapped(), zero_resident, restored, page));
        });

        let (evicted, swapped, zero_resident, restored, page) = results.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(evicted, Ok(()));
        assert!(swapped);
        assert!(zero_resident);
        assert_eq!(restored, Ok(()));
        assert_eq!(page.unwrap(), [0xAB; PAGE_SIZE]);

        let name = swap_file_name(init, 0x1000);
        assert_eq!(name, "/1_4096.swp");
        assert_eq!(machine.fs().contents(&name).unwrap(), [0xAB; PAGE_SIZE]);
        assert_eq!(machine.fs().open_files(), 0);

        #[cfg(feature = "swap-stats")]
        {
            let stats = machine.kernel.swap_stats();
            assert_eq!((stats.evicted(), stats.restored()), (1, 1));
        }
    }

    #[test]
    fn test_workers_retire_and_are_reclaimed() {
        let machine = Machine::new();
        let (report, results) = sim::report();

        machine.boot(2, move |k| {
            k.grow_memory(PAGE_SIZE as isize).unwrap();
            sim::touch(k, 0);
            k.request_swap_out().unwrap();
            k.handle_swap_fault(0x1000).unwrap();
            report.send(());
        });
        results.recv_timeout(TIMEOUT).unwrap();

        let k = machine.kernel;
        assert!(eventually(|| {
            !k.swap_queue(Direction::Evict).worker_active() && !k.swap_queue(Direction::Restore).worker_active()
        }));
        // Init's stack, directory and two pages; nothing of the workers.
        assert!(eventually(|| machine.memory().frames_in_use() == 4));
        assert!(eventually(|| k.dump().len() == 1));
        assert!(k.swap_queue(Direction::Evict).is_empty());
    }

    #[test]
    fn test_started_worker_with_empty_queue_retires() {
        let machine = Machine::new();
        let (report, results) = sim::report();
        machine.boot(1, move |_| report.send(()));
        results.recv_timeout(TIMEOUT).unwrap();

        let k = machine.kernel;
        let baseline = machine.memory().frames_in_use();
        // The second call either finds the first worker or starts another,
        // depending on whether it has retired yet.
        k.ensure_swap_worker(Direction::Evict).unwrap();
        k.ensure_swap_worker(Direction::Evict).unwrap();

        assert!(eventually(|| !k.swap_queue(Direction::Evict).worker_active()));
        assert!(eventually(|| machine.memory().frames_in_use() == baseline));
        assert!(eventually(|| k.dump().iter().all(|p| p.name.as_str() != "swap_out")));
    }

    // ========================================
    // Victim Choice
    // ========================================

    #[test]
    fn test_consecutive_evictions_restart_the_sweep() {
        let machine = Machine::new();
        let (report, results) = sim::report();

        machine.boot(2, move |k| {
            let child_report = report.clone();
            sim::fork(k, move |k, _| {
                k.grow_memory(2 * PAGE_SIZE as isize).unwrap();
                sim::touch(k, 0);

                k.request_swap_out().unwrap();
                let first: Vec<bool> = [0, 0x1000, 0x2000]
                    .iter()
                    .map(|&va| sim::user_entry(k, va).unwrap().is_swapped())
                    .collect();
                // The first sweep cleared page 0's reference bit.
                k.request_swap_out().unwrap();
                let second: Vec<bool> = [0, 0x1000, 0x2000]
                    .iter()
                    .map(|&va| sim::user_entry(k, va).unwrap().is_swapped())
                    .collect();
                child_report.send((k.current_pid().unwrap(), first, second));
            })
            .unwrap();
            k.wait().unwrap();
        });

        let (pid, first, second) = results.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(first, [false, true, false]);
        assert_eq!(second, [true, true, false]);
        assert!(machine.fs().contents(&swap_file_name(pid, 0x1000)).is_some());
        assert!(machine.fs().contents(&swap_file_name(pid, 0)).is_some());
    }

    #[test]
    fn test_nothing_to_evict() {
        let machine = Machine::new();
        let (report, results) = sim::report();

        machine.boot(1, move |k| {
            let child_report = report.clone();
            sim::fork(k, move |k, _| {
                k.grow_memory(-(PAGE_SIZE as isize)).unwrap();
                child_report.send(k.request_swap_out());
            })
            .unwrap();
            k.wait().unwrap();
        });

        assert_eq!(results.recv_timeout(TIMEOUT).unwrap(), Err(SwapError::NoResidentPage));
        assert!(!machine.kernel.swap_queue(Direction::Evict).worker_active());
    }

    #[test]
    fn test_fault_on_resident_page_is_not_a_swap_fault() {
        let machine = Machine::new();
        let (report, results) = sim::report();

        machine.boot(1, move |k| {
            report.send(k.handle_swap_fault(0x10));
            // No page table at all up there.
            report.send(k.handle_swap_fault(0x4000_0000));
        });

        assert_eq!(results.recv_timeout(TIMEOUT).unwrap(), Err(SwapError::NotSwapped));
        assert_eq!(results.recv_timeout(TIMEOUT).unwrap(), Err(SwapError::NotSwapped));
    }

    // ========================================
    // Concurrent Requests
    // ========================================

    #[test]
    fn test_requests_from_many_processes() {
        const CHILDREN: u8 = 4;

        let machine = Machine::new();
        let (report, results) = sim::report();

        machine.boot(3, move |k| {
            for byte in 1..=CHILDREN {
                let child_report = report.clone();
                sim::fork(k, move |k, _| {
                    k.grow_memory(PAGE_SIZE as isize).unwrap();
                    sim::fill_page(k, 0x1000, byte);
                    sim::touch(k, 0);

                    k.request_swap_out().unwrap();
                    let swapped = sim::user_entry(k, 0x1000).unwrap().is_swapped();
                    k.handle_swap_fault(0x1000).unwrap();
                    let intact = sim::read_page(k, 0x1000).unwrap().iter().all(|&b| b == byte);
                    child_report.send((k.current_pid().unwrap(), byte, swapped && intact));
                })
                .unwrap();
            }
            for _ in 0..CHILDREN {
                k.wait().unwrap();
            }
        });

        for _ in 0..CHILDREN {
            let (pid, byte, ok) = results.recv_timeout(TIMEOUT).unwrap();
            assert!(ok, "pid {} lost its page", pid);
            let file = machine.fs().contents(&swap_file_name(pid, 0x1000)).unwrap();
            assert!(file.iter().all(|&b| b == byte));
        }

        #[cfg(feature = "swap-stats")]
        {
            let stats = machine.kernel.swap_stats();
            assert_eq!(stats.evicted(), u64::from(CHILDREN));
            assert_eq!(stats.restored(), u64::from(CHILDREN));
        }
    }

    #[test]
    fn test_one_worker_drains_queued_requests() {
        const CHILDREN: u8 = 4;

        let machine = Machine::new();
        let (report, results) = sim::report();

        // One CPU: every child queues its request before the worker it
        // started gets a turn.
        machine.boot(1, move |k| {
            for byte in 1..=CHILDREN {
                let child_report = report.clone();
                sim::fork(k, move |k, _| {
                    k.grow_memory(PAGE_SIZE as isize).unwrap();
                    sim::fill_page(k, 0x1000, byte);
                    sim::touch(k, 0);

                    let evictors = count_named(k, SWAP_OUT_WORKER);
                    k.request_swap_out().unwrap();
                    let restorers = count_named(k, SWAP_IN_WORKER);
                    k.handle_swap_fault(0x1000).unwrap();

                    let intact = sim::read_page(k, 0x1000).unwrap().iter().all(|&b| b == byte);
                    child_report.send((evictors, restorers, intact));
                })
                .unwrap();
            }
            for _ in 0..CHILDREN {
                k.wait().unwrap();
            }
            // Pids are handed out in order, so the next one tells how many
            // records were created meanwhile.
            let next = sim::fork(k, |_, _| {}).unwrap();
            k.wait().unwrap();
            report.send((next.as_u32() as usize, 0, true));
        });

        let mut seen = [Vec::new(), Vec::new()];
        for _ in 0..CHILDREN {
            let (evictors, restorers, intact) = results.recv_timeout(TIMEOUT).unwrap();
            assert!(intact);
            seen[0].push(evictors);
            seen[1].push(restorers);
        }
        // The first requester starts the worker; the rest find it active.
        assert_eq!(seen[0], [0, 1, 1, 1]);
        assert_eq!(seen[1], [0, 1, 1, 1]);

        // Init, the children, one worker per direction, then the next fork.
        let (next, _, _) = results.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(Pid(next as u32), Pid(1 + u32::from(CHILDREN) + 2 + 1));

        #[cfg(feature = "swap-stats")]
        {
            let stats = machine.kernel.swap_stats();
            assert_eq!((stats.evicted(), stats.restored()), (4, 4));
        }
    }

    #[test]
    fn test_refused_request_leaves_nothing_behind() {
        let machine = Machine::new();
        let (report, results) = sim::report();

        machine.boot(1, move |k| {
            k.grow_memory(PAGE_SIZE as isize).unwrap();
            sim::touch(k, 0);
            k.request_swap_out().unwrap();

            // No frame left for a worker's kernel stack.
            let memory = &k.platform().memory;
            memory.set_frame_limit(Some(memory.frames_in_use()));
            let refused = k.handle_swap_fault(0x1010);

            let slot = k.current().unwrap();
            // SAFETY: our own record.
            let fault_addr = unsafe { k.procs.data(slot) }.fault_addr;
            let queue = k.swap_queue(Direction::Restore);
            let (queued, active) = (queue.len(), queue.worker_active());
            let pending = k.procs.lock().swap_pending(slot);

            memory.set_frame_limit(None);
            let restored = k.handle_swap_fault(0x1010);
            report.send((refused, fault_addr, queued, active, pending, restored));
        });

        assert_eq!(
            results.recv_timeout(TIMEOUT).unwrap(),
            (Err(SwapError::Worker(ProcError::OutOfMemory)), 0, 0, false, false, Ok(()))
        );
    }
}
