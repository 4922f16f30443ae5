//! Process lifecycle core
//!
//! This crate implements the user-process lifecycle for a kernel where every
//! process owns exactly one address space: creation by duplication (`fork`),
//! image replacement (`execv`), termination with status propagation
//! (`_exit`) and blocking status collection (`waitpid`).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            syscall (dispatch / handle)        │
//! ├──────────────────────────────────────────────┤
//! │               ProcessManager                  │
//! │  ┌──────┐ ┌──────┐ ┌──────┐ ┌──────┐         │
//! │  │ fork │ │ exec │ │ exit │ │ wait │         │
//! │  └──┬───┘ └──┬───┘ └──┬───┘ └──┬───┘         │
//! │     └────────┴───┬────┴────────┘             │
//! │          ProcessTable + Process              │
//! └──────────────────┼───────────────────────────┘
//!                    │
//!   Services: VirtualMemory · ExecutableSource · ImageLoader · Scheduler
//! ```
//!
//! The services on the bottom row (page tables, the ELF loader, the VFS,
//! context switching) belong to the embedding kernel and are reached through
//! the traits in [`vm`], [`loader`] and [`sched`].
//!
//! # Modules
//!
//! - `process`: process entity, table, pid allocation and the four protocols
//! - `vm`: address-space contract and user/kernel copy helpers
//! - `loader`: executable and image-loader contracts
//! - `sched`: scheduler contract and the fork trampoline
//! - `sync`: condition variable paired with `spin::Mutex`
//! - `syscall`: syscall numbers, trap frame and dispatch

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod loader;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod vm;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use config::{LifecycleConfig, PointerWidth};
pub use error::{ProcError, Result};
pub use process::{
    ChildStatus, LifecycleFlags, Process, ProcessId, ProcessManager, ProcessSnapshot,
    ProcessTable, Services, UserEntry, WaitStatus,
};
pub use syscall::{Disposition, TrapFrame};
pub use vm::UserAddr;

/// Log subsystem initialization
pub fn init() {
    log::info!(
        "[PROC] Lifecycle core ready (pids {}..={}, {}-byte argument slots)",
        config::PID_MIN,
        config::PID_MAX,
        config::ARG_SLOT_SIZE
    );
}
