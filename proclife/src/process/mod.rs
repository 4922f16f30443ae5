//! Process Management
//!
//! The process entity, the table that owns the process tree, pid allocation,
//! and the four lifecycle protocols (`fork`, `execv`, `_exit`, `waitpid`)
//! implemented on [`ProcessManager`].
//!
//! # Locking
//!
//! Every process has one lock protecting its parent link, its children
//! bookkeeping and its lifecycle flags. When two are held at once, the
//! ancestor's is always taken first. The exit path takes its parent's lock
//! and then its own, one after the other, never nested.

pub mod entity;
pub mod exec;
pub mod exit;
pub mod fork;
pub mod manager;
pub mod pid;
pub mod table;
pub mod wait;

pub use entity::{ChildStatus, LifecycleFlags, Process};
pub use exec::{StackLayout, UserEntry};
pub use manager::{ProcessManager, Services};
pub use pid::{PidAllocator, ProcessId};
pub use table::{ProcessSnapshot, ProcessTable};
pub use wait::WaitStatus;
