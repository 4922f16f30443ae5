//! Scheduler contract
//!
//! The lifecycle core asks the scheduler for two kinds of new execution
//! context: a forked child that resumes in user mode from a copy of its
//! parent's trap frame, and a first process that starts at an image entry
//! point. Before either runs user code, the new context must call
//! [`Process::activate_space`].

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::error::Result;
use crate::process::{Process, UserEntry};
use crate::syscall::TrapFrame;

/// Entry state of a forked child
///
/// Holds the parent's register snapshot taken at the `fork` syscall. The
/// child's trampoline installs [`ForkEntry::into_user_frame`] and returns to
/// user mode, where `fork` appears to return 0.
#[derive(Debug, Clone)]
pub struct ForkEntry {
    frame: Box<TrapFrame>,
}

impl ForkEntry {
    pub fn new(parent_frame: &TrapFrame) -> Self {
        Self {
            frame: Box::new(parent_frame.clone()),
        }
    }

    /// The parent's frame as captured at the syscall
    pub fn parent_frame(&self) -> &TrapFrame {
        &self.frame
    }

    /// Frame the child resumes with: the parent's, with a zero return value
    pub fn into_user_frame(self) -> TrapFrame {
        let mut frame = *self.frame;
        frame.set_return(0);
        frame
    }
}

/// Scheduler / execution-context primitives
pub trait Scheduler: Send + Sync {
    /// Create a schedulable context for a forked child.
    ///
    /// On error nothing has been scheduled.
    fn spawn_forked(&self, child: Arc<Process>, entry: ForkEntry) -> Result<()>;

    /// Create a schedulable context that enters `process` at `entry`.
    fn spawn_initial(&self, process: Arc<Process>, entry: UserEntry) -> Result<()>;

    /// Give up the CPU. Called while polling in `waitpid`.
    fn yield_now(&self);
}
