//! Process Table
//!
//! Registry of every process that has not finished exiting, indexed by pid.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use spin::RwLock;

use super::entity::{LifecycleFlags, Process};
use super::pid::ProcessId;
use crate::config::MAX_PROCESSES;
use crate::error::{ProcError, Result};

/// Global process table
pub struct ProcessTable {
    /// All processes indexed by PID
    processes: RwLock<HashMap<ProcessId, Arc<Process>>>,
    /// Maximum number of registered processes
    max_processes: usize,
}

impl ProcessTable {
    /// Create a new empty process table
    pub fn new(max_processes: usize) -> Self {
        Self {
            processes: RwLock::new(HashMap::new()),
            max_processes,
        }
    }

    /// Add a process
    ///
    /// Fails with [`ProcError::ProcessLimitReached`] when the table is full.
    pub fn insert(&self, process: Arc<Process>) -> Result<ProcessId> {
        let pid = process.pid();
        let mut processes = self.processes.write();
        if processes.len() >= self.max_processes {
            log::warn!("[PROC] Process limit ({}) reached", self.max_processes);
            return Err(ProcError::ProcessLimitReached);
        }
        let previous = processes.insert(pid, process);
        assert!(previous.is_none(), "[PROC] pid {} registered twice", pid);
        Ok(pid)
    }

    /// Remove a process
    pub fn remove(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.write().remove(&pid)
    }

    /// Get a process by PID
    pub fn get(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.read().get(&pid).cloned()
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.processes.read().contains_key(&pid)
    }

    /// Get process count
    pub fn count(&self) -> usize {
        self.processes.read().len()
    }

    /// Point-in-time view of every registered process, ordered by pid
    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        // Collect first: process locks are never taken under the table lock
        let processes: Vec<Arc<Process>> = self.processes.read().values().cloned().collect();

        let mut out: Vec<ProcessSnapshot> = processes
            .iter()
            .map(|p| ProcessSnapshot {
                pid: p.pid(),
                parent: p.parent_pid(),
                name: p.name(),
                flags: p.flags(),
                children: p.child_count(),
            })
            .collect();
        out.sort_by_key(|s| s.pid);
        out
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new(MAX_PROCESSES)
    }
}

/// Lightweight snapshot of a process
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub name: String,
    pub flags: LifecycleFlags,
    /// Tracked children, reported or not
    pub children: usize,
}
