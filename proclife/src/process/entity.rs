//! Process entity
//!
//! A process is shared through `Arc`. Strong references are held by its own
//! execution context, the process table (until exit completes) and its
//! parent's bookkeeping slot (until the child reports or is disowned). The
//! link back to the parent is a `Weak`.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt;
use spin::{Mutex, RwLock};

use super::pid::{PidToken, ProcessId};
use crate::sync::Condvar;
use crate::vm::AddressSpace;

bitflags! {
    /// Lifecycle state of a process
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LifecycleFlags: u32 {
        /// `_exit` has started
        const EXITING = 1 << 0;
        /// Status reported; waiters may proceed
        const EXITED = 1 << 1;
        /// The parent exited first
        const ORPHANED = 1 << 2;
        /// The image has been replaced at least once
        const EXECED = 1 << 3;
    }
}

/// Status of a child as recorded in its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Alive,
    Exited(i32),
}

/// One entry of a parent's children bookkeeping
pub(crate) struct ChildSlot {
    /// Cleared when the child reports or is disowned
    pub(crate) process: Option<Arc<Process>>,
    pub(crate) status: ChildStatus,
    _pid: Arc<PidToken>,
}

impl ChildSlot {
    pub(crate) fn new(process: Arc<Process>) -> Self {
        let pid = Arc::clone(&process.token);
        Self {
            process: Some(process),
            status: ChildStatus::Alive,
            _pid: pid,
        }
    }

    /// Record the child's exit code. The status is write-once.
    pub(crate) fn record(&mut self, code: i32) {
        match self.status {
            ChildStatus::Alive => self.status = ChildStatus::Exited(code),
            ChildStatus::Exited(previous) => panic!(
                "[PROC] exit status written twice (had {}, got {})",
                previous, code
            ),
        }
        self.process = None;
    }
}

/// Children bookkeeping of one process, in creation order.
///
/// Entries are appended at fork and never reordered, so a pid handed out
/// after the allocator wraps still sorts after its older siblings.
#[derive(Default)]
pub(crate) struct ChildList {
    slots: Vec<(ProcessId, ChildSlot)>,
}

impl ChildList {
    pub(crate) fn insert(&mut self, pid: ProcessId, slot: ChildSlot) {
        assert!(
            self.get(&pid).is_none(),
            "[PROC] child {} tracked twice",
            pid
        );
        self.slots.push((pid, slot));
    }

    pub(crate) fn get(&self, pid: &ProcessId) -> Option<&ChildSlot> {
        self.slots
            .iter()
            .find(|(p, _)| p == pid)
            .map(|(_, slot)| slot)
    }

    pub(crate) fn get_mut(&mut self, pid: &ProcessId) -> Option<&mut ChildSlot> {
        self.slots
            .iter_mut()
            .find(|(p, _)| p == pid)
            .map(|(_, slot)| slot)
    }

    pub(crate) fn remove(&mut self, pid: &ProcessId) -> Option<ChildSlot> {
        let index = self.slots.iter().position(|(p, _)| p == pid)?;
        Some(self.slots.remove(index).1)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ProcessId, &ChildSlot)> {
        self.slots.iter().map(|(pid, slot)| (pid, slot))
    }

    pub(crate) fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.slots.iter().map(|(pid, _)| *pid)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}

/// State guarded by the process lock
pub(crate) struct ProcessInner {
    pub(crate) parent: Option<Weak<Process>>,
    pub(crate) children: ChildList,
    pub(crate) flags: LifecycleFlags,
}

/// A user process
pub struct Process {
    pid: ProcessId,
    token: Arc<PidToken>,
    name: RwLock<String>,
    pub(crate) inner: Mutex<ProcessInner>,
    /// Signalled under `inner` once the exit status has been reported
    pub(crate) finished: Condvar,
    /// Touched only by the process's own context; never held while taking
    /// another lock.
    space: Mutex<Option<Box<dyn AddressSpace>>>,
}

impl Process {
    pub(crate) fn new(
        token: Arc<PidToken>,
        name: String,
        space: Option<Box<dyn AddressSpace>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pid: token.pid(),
            token,
            name: RwLock::new(name),
            inner: Mutex::new(ProcessInner {
                parent: None,
                children: ChildList::default(),
                flags: LifecycleFlags::empty(),
            }),
            finished: Condvar::new(),
            space: Mutex::new(space),
        })
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.write() = name;
    }

    /// Parent pid, or `None` for a first process or an orphan
    pub fn parent_pid(&self) -> Option<ProcessId> {
        let inner = self.inner.lock();
        inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|p| p.pid)
    }

    pub fn flags(&self) -> LifecycleFlags {
        self.inner.lock().flags
    }

    pub fn has_exited(&self) -> bool {
        self.flags().contains(LifecycleFlags::EXITED)
    }

    /// Recorded status of child `pid`, if tracked
    pub fn child_status(&self, pid: ProcessId) -> Option<ChildStatus> {
        self.inner.lock().children.get(&pid).map(|slot| slot.status)
    }

    /// Whether the child slot for `pid` still holds the child
    pub fn child_is_linked(&self, pid: ProcessId) -> bool {
        self.inner
            .lock()
            .children
            .get(&pid)
            .is_some_and(|slot| slot.process.is_some())
    }

    /// Tracked children, in creation order
    pub fn children(&self) -> Vec<ProcessId> {
        self.inner.lock().children.pids().collect()
    }

    pub fn child_count(&self) -> usize {
        self.inner.lock().children.len()
    }

    /// Load this process's address space into the MMU.
    ///
    /// New execution contexts call this before entering user mode.
    pub fn activate_space(&self) {
        if let Some(space) = self.space.lock().as_ref() {
            space.activate();
        }
    }

    pub fn has_space(&self) -> bool {
        self.space.lock().is_some()
    }

    /// Run `f` on the address space; `None` if the process has none.
    pub fn with_space<R>(&self, f: impl FnOnce(&mut dyn AddressSpace) -> R) -> Option<R> {
        let mut space = self.space.lock();
        match space.as_mut() {
            Some(space) => {
                let space: &mut dyn AddressSpace = &mut **space;
                Some(f(space))
            }
            None => None,
        }
    }

    /// Install `space`, returning the previous one.
    pub(crate) fn replace_space(
        &self,
        space: Option<Box<dyn AddressSpace>>,
    ) -> Option<Box<dyn AddressSpace>> {
        core::mem::replace(&mut *self.space.lock(), space)
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &*self.name.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::process::pid::PidAllocator;

    fn make(pids: &PidAllocator, name: &str) -> Arc<Process> {
        Process::new(pids.allocate().unwrap(), String::from(name), None)
    }

    #[test]
    fn test_status_is_write_once() {
        let pids = PidAllocator::new(&LifecycleConfig::default());
        let child = make(&pids, "child");
        let mut slot = ChildSlot::new(Arc::clone(&child));

        assert_eq!(slot.status, ChildStatus::Alive);
        slot.record(7);
        assert_eq!(slot.status, ChildStatus::Exited(7));
        assert!(slot.process.is_none());
    }

    #[test]
    #[should_panic(expected = "written twice")]
    fn test_second_status_write_panics() {
        let pids = PidAllocator::new(&LifecycleConfig::default());
        let mut slot = ChildSlot::new(make(&pids, "child"));
        slot.record(1);
        slot.record(2);
    }

    #[test]
    fn test_slot_keeps_pid_reserved() {
        let pids = PidAllocator::new(&LifecycleConfig::default());
        let child = make(&pids, "child");
        let pid = child.pid();
        let mut slot = ChildSlot::new(child);

        slot.record(0);
        assert!(pids.is_reserved(pid));
        drop(slot);
        assert!(!pids.is_reserved(pid));
    }

    #[test]
    fn test_child_list_keeps_insertion_order() {
        let pids = PidAllocator::new(&LifecycleConfig::default());
        let a = make(&pids, "a");
        let b = make(&pids, "b");
        let c = make(&pids, "c");

        // Insert out of pid order, as after a wrap
        let mut list = ChildList::default();
        for child in [&c, &a, &b] {
            list.insert(child.pid(), ChildSlot::new(Arc::clone(child)));
        }
        assert_eq!(
            list.pids().collect::<Vec<_>>(),
            vec![c.pid(), a.pid(), b.pid()]
        );

        list.get_mut(&a.pid()).unwrap().record(3);
        assert_eq!(list.get(&a.pid()).unwrap().status, ChildStatus::Exited(3));

        assert!(list.remove(&a.pid()).is_some());
        assert!(list.remove(&a.pid()).is_none());
        assert_eq!(list.pids().collect::<Vec<_>>(), vec![c.pid(), b.pid()]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_parent_pid_follows_weak_link() {
        let pids = PidAllocator::new(&LifecycleConfig::default());
        let parent = make(&pids, "parent");
        let child = make(&pids, "child");

        child.inner.lock().parent = Some(Arc::downgrade(&parent));
        assert_eq!(child.parent_pid(), Some(parent.pid()));

        drop(parent);
        assert_eq!(child.parent_pid(), None);
    }
}
