//! `waitpid` and the wait-status encoding

use alloc::sync::Arc;

use super::entity::{ChildStatus, LifecycleFlags, Process};
use super::manager::ProcessManager;
use super::pid::ProcessId;
use crate::error::{ProcError, Result};
use crate::vm::{copy_to_user, UserAddr};

/// Wait status in the layout the C library decodes
///
/// Exit code in bits 8..15, low seven bits zero for a normal exit, so
/// `WIFEXITED` and `WEXITSTATUS` work unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus(pub i32);

impl WaitStatus {
    /// Status of a process that exited normally with `code`
    pub const fn exited(code: i32) -> Self {
        WaitStatus((code & 0xff) << 8)
    }

    /// `WIFEXITED`
    pub const fn is_exited(self) -> bool {
        self.0 & 0x7f == 0
    }

    /// `WEXITSTATUS`
    pub const fn exit_code(self) -> i32 {
        (self.0 >> 8) & 0xff
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl ProcessManager {
    /// Wait for child `pid` of `caller` to exit and return its pid.
    ///
    /// The encoded status is stored at `status_out` unless it is null.
    /// `options` must be 0. Waiting again on a collected child returns the
    /// same status.
    pub fn waitpid(
        &self,
        caller: &Arc<Process>,
        pid: i64,
        status_out: UserAddr,
        options: i32,
    ) -> Result<ProcessId> {
        if options != 0 {
            return Err(ProcError::InvalidArgument);
        }
        if pid <= 0 {
            return Err(ProcError::NoSuchChild);
        }
        let target = ProcessId(pid as u64);

        let code = self.wait_for_child(caller, target)?;
        let status = WaitStatus::exited(code);

        if !status_out.is_null() {
            caller
                .with_space(|space| copy_to_user(space, status_out, &status.raw().to_ne_bytes()))
                .ok_or(ProcError::BadAddress)??;
        }

        Ok(target)
    }

    fn wait_for_child(&self, caller: &Process, target: ProcessId) -> Result<i32> {
        let mut parent = caller.inner.lock();

        let child = match parent.children.get(&target) {
            Some(slot) => slot.process.clone(),
            None => return Err(ProcError::NoSuchChild),
        };

        if let Some(child) = child {
            // Hand off to the child's lock before letting go of ours
            let guard = child.inner.lock();
            drop(parent);

            log::debug!("[PROC wait] {} waiting for {}", caller.pid(), target);
            let guard = child.finished.wait_while(
                &child.inner,
                guard,
                |inner| !inner.flags.contains(LifecycleFlags::EXITED),
                || self.services.scheduler.yield_now(),
            );
            drop(guard);
            log::debug!("[PROC wait] {} woke: {} exited", caller.pid(), target);

            parent = caller.inner.lock();
        }

        match parent.children.get(&target).map(|slot| slot.status) {
            Some(ChildStatus::Exited(code)) => Ok(code),
            other => panic!(
                "[PROC] child {} of {} finished without a status ({:?})",
                target,
                caller.pid(),
                other
            ),
        }
    }
}
