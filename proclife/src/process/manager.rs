//! Process Manager
//!
//! Owns the process table, the pid allocator and the collaborator services.
//! The lifecycle operations are implemented in sibling modules:
//! [`fork`](super::fork), [`exec`](super::exec), [`exit`](super::exit) and
//! [`wait`](super::wait).

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::entity::Process;
use super::exec::{marshal_args, UserEntry};
use super::pid::{PidAllocator, ProcessId};
use super::table::{ProcessSnapshot, ProcessTable};
use crate::config::LifecycleConfig;
use crate::error::{ProcError, Result};
use crate::loader::{ExecutableSource, ImageLoader};
use crate::sched::Scheduler;
use crate::vm::VirtualMemory;

/// Collaborators supplied by the embedding kernel
#[derive(Clone)]
pub struct Services {
    pub vm: Arc<dyn VirtualMemory>,
    pub vfs: Arc<dyn ExecutableSource>,
    pub loader: Arc<dyn ImageLoader>,
    pub scheduler: Arc<dyn Scheduler>,
}

/// Process manager
pub struct ProcessManager {
    pub(crate) table: ProcessTable,
    pub(crate) pids: PidAllocator,
    pub(crate) config: LifecycleConfig,
    pub(crate) services: Services,
}

impl ProcessManager {
    /// Create a new process manager
    pub fn new(config: LifecycleConfig, services: Services) -> Self {
        log::debug!(
            "[PROC] Process manager: pids {}..={}, {} max processes, {}-byte pointers",
            config.pid_min,
            config.pid_max,
            config.max_processes,
            config.pointer_width.bytes()
        );
        Self {
            table: ProcessTable::new(config.max_processes),
            pids: PidAllocator::new(&config),
            config,
            services,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn pids(&self) -> &PidAllocator {
        &self.pids
    }

    /// `getpid`
    pub fn getpid(&self, caller: &Process) -> ProcessId {
        caller.pid()
    }

    pub fn lookup(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.table.get(pid)
    }

    pub fn process_count(&self) -> usize {
        self.table.count()
    }

    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        self.table.snapshot()
    }

    /// Create a parentless process running `path` with `args`.
    ///
    /// The image is loaded and its stack built here; the scheduler then
    /// starts it at the entry point. On failure nothing is registered.
    pub fn spawn(&self, path: &str, args: &[&str]) -> Result<ProcessId> {
        let token = self.pids.allocate()?;
        let pid = token.pid();

        let mut exe = self.services.vfs.open(path)?;
        let mut space = self.services.vm.create()?;
        let entry = self.services.loader.load(&mut *exe, &mut *space)?;
        drop(exe);

        let top = space.define_stack()?;
        let args: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        if args.iter().any(|a| a.contains(&0)) {
            return Err(ProcError::InvalidArgument);
        }
        let layout = marshal_args(&mut *space, top, &args, &self.config)?;

        let process = Process::new(token, String::from(path), Some(space));
        self.table.insert(Arc::clone(&process))?;

        let user_entry = UserEntry {
            entry,
            stack_pointer: layout.stack_pointer,
            argc: args.len(),
            argv: layout.argv,
        };
        if let Err(e) = self
            .services
            .scheduler
            .spawn_initial(Arc::clone(&process), user_entry)
        {
            log::warn!("[PROC] Could not schedule {} (pid {}): {}", path, pid, e);
            self.table.remove(pid);
            return Err(e);
        }

        log::info!(
            "[PROC] Created process {} ({}) entry={} sp={}",
            pid,
            path,
            entry,
            layout.stack_pointer
        );
        Ok(pid)
    }
}
