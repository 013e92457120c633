//! Process Management
//!
//! The process table and its state machine, and the lifecycle operations
//! (fork, exit, wait, kill, grow) built on it.

pub mod context;
pub mod manager;
pub mod table;

pub use context::TrapFrame;
pub use manager::{ProcError, ProcSnapshot};
pub use table::{Pid, ProcData, ProcName, ProcState, ProcTable, Registry, RegistryGuard};
