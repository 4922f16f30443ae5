//! `fork`

use alloc::sync::Arc;

use super::entity::{ChildSlot, Process};
use super::manager::ProcessManager;
use super::pid::ProcessId;
use crate::error::{ProcError, Result};
use crate::sched::ForkEntry;
use crate::syscall::TrapFrame;

impl ProcessManager {
    /// Duplicate `caller`.
    ///
    /// The child gets a copy of the caller's address space and a new
    /// execution context that resumes from `frame` with a zero return
    /// value. Returns the child's pid. On error no child is linked to the
    /// caller or registered in the table.
    pub fn fork(&self, caller: &Arc<Process>, frame: &TrapFrame) -> Result<ProcessId> {
        let token = self.pids.allocate()?;
        let pid = token.pid();

        let space = caller
            .with_space(|space| space.duplicate())
            .ok_or(ProcError::InvalidArgument)?
            .map_err(|e| {
                log::warn!(
                    "[PROC fork] Address space copy for pid {} failed: {}",
                    caller.pid(),
                    e
                );
                ProcError::OutOfMemory
            })?;

        let child = Process::new(token, caller.name(), Some(space));
        self.table.insert(Arc::clone(&child))?;

        {
            let mut parent = caller.inner.lock();
            child.inner.lock().parent = Some(Arc::downgrade(caller));
            parent.children.insert(pid, ChildSlot::new(Arc::clone(&child)));
        }

        if let Err(e) = self
            .services
            .scheduler
            .spawn_forked(Arc::clone(&child), ForkEntry::new(frame))
        {
            log::warn!("[PROC fork] Could not schedule child {}: {}", pid, e);
            caller.inner.lock().children.remove(&pid);
            self.table.remove(pid);
            return Err(e);
        }

        log::debug!("[PROC fork] {} -> {}", caller.pid(), pid);
        Ok(pid)
    }
}
