//! Kernel Unit Tests Module
//!
//! Cross-subsystem tests. They boot the process core on the host
//! simulation in [`sim`], with one thread per CPU and per process.


mod swap_tests;
