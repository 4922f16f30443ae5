//! `_exit`

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::entity::{LifecycleFlags, Process};
use super::manager::ProcessManager;

impl ProcessManager {
    /// Terminate `caller` with `code`.
    ///
    /// Reports the code to the parent (if any), wakes a waiting parent,
    /// disowns live children, destroys the address space and unregisters
    /// the process. The caller's execution context must not run user code
    /// afterwards.
    ///
    /// # Panics
    ///
    /// If `caller` has already exited, or has no address space.
    pub fn exit(&self, caller: Arc<Process>, code: i32) {
        let pid = caller.pid();

        let parent = {
            let mut inner = caller.inner.lock();
            if inner.flags.contains(LifecycleFlags::EXITING) {
                panic!("[PROC] pid {} exited twice", pid);
            }
            inner.flags.insert(LifecycleFlags::EXITING);
            inner.parent.as_ref().and_then(|weak| weak.upgrade())
        };

        // Report to the parent under its lock alone
        let reported = match parent {
            Some(parent) => {
                let mut inner = parent.inner.lock();
                let found = match inner.children.get_mut(&pid) {
                    Some(slot) => {
                        slot.record(code);
                        true
                    }
                    // Parent already disowned us
                    None => false,
                };
                found
            }
            None => false,
        };

        // Wake the parent, then disown our own children
        let orphaned = {
            let mut inner = caller.inner.lock();
            inner.flags.insert(LifecycleFlags::EXITED);
            caller.finished.notify_all(&inner);

            let mut orphaned = Vec::new();
            for (child_pid, slot) in inner.children.iter() {
                if let Some(child) = slot.process.as_ref() {
                    let mut child_inner = child.inner.lock();
                    child_inner.parent = None;
                    child_inner.flags.insert(LifecycleFlags::ORPHANED);
                    orphaned.push(*child_pid);
                }
            }
            inner.children.clear();
            inner.parent = None;
            orphaned
        };

        let space = caller
            .replace_space(None)
            .unwrap_or_else(|| panic!("[PROC] pid {} exited without an address space", pid));
        space.deactivate();
        drop(space);

        self.table.remove(pid);

        if !orphaned.is_empty() {
            log::debug!("[PROC] pid {} orphaned {:?}", pid, orphaned);
        }
        log::info!(
            "[PROC] Process {} exited with code {}{}",
            pid,
            code,
            if reported { "" } else { " (status discarded)" }
        );
    }
}
