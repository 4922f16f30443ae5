//! Process IDs and their allocator
//!
//! Pids are handed out cyclically from the configured range. A pid is held
//! by a reservation token; the process entity and its parent's status slot
//! each keep a clone, so the pid returns to the pool only when both are
//! gone.

use alloc::sync::Arc;
use core::fmt;
use hashbrown::HashSet;
use spin::Mutex;

use crate::config::{LifecycleConfig, KERNEL_PID};
use crate::error::{ProcError, Result};

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl ProcessId {
    /// Kernel process ID (always 0)
    pub const KERNEL: ProcessId = ProcessId(KERNEL_PID);

    /// Create a ProcessId from a raw u64 value
    pub const fn from_u64(val: u64) -> Self {
        ProcessId(val)
    }

    /// Get the raw ID value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct PidPool {
    min: u64,
    max: u64,
    next: u64,
    live: HashSet<u64>,
}

/// Reservation of one pid. Dropping the last clone releases it.
pub struct PidToken {
    pid: ProcessId,
    pool: Arc<Mutex<PidPool>>,
}

impl PidToken {
    pub fn pid(&self) -> ProcessId {
        self.pid
    }
}

impl Drop for PidToken {
    fn drop(&mut self) {
        self.pool.lock().live.remove(&self.pid.0);
    }
}

impl fmt::Debug for PidToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PidToken").field(&self.pid.0).finish()
    }
}

/// Cyclic pid allocator
pub struct PidAllocator {
    pool: Arc<Mutex<PidPool>>,
}

impl PidAllocator {
    pub fn new(config: &LifecycleConfig) -> Self {
        let min = config.pid_min.max(KERNEL_PID + 1);
        let max = config.pid_max.max(min);
        Self {
            pool: Arc::new(Mutex::new(PidPool {
                min,
                max,
                next: min,
                live: HashSet::new(),
            })),
        }
    }

    /// Reserve the next free pid.
    ///
    /// Fails with [`ProcError::PidsExhausted`] when every pid in the range
    /// is reserved.
    pub fn allocate(&self) -> Result<Arc<PidToken>> {
        let mut pool = self.pool.lock();
        let span = pool.max - pool.min + 1;

        let mut candidate = pool.next;
        for _ in 0..span {
            if !pool.live.contains(&candidate) {
                pool.live.insert(candidate);
                pool.next = if candidate == pool.max {
                    pool.min
                } else {
                    candidate + 1
                };
                return Ok(Arc::new(PidToken {
                    pid: ProcessId(candidate),
                    pool: Arc::clone(&self.pool),
                }));
            }
            candidate = if candidate == pool.max {
                pool.min
            } else {
                candidate + 1
            };
        }

        log::warn!(
            "[PROC] Pid range {}..={} exhausted",
            pool.min,
            pool.max
        );
        Err(ProcError::PidsExhausted)
    }

    /// Number of reserved pids
    pub fn in_use(&self) -> usize {
        self.pool.lock().live.len()
    }

    pub fn is_reserved(&self, pid: ProcessId) -> bool {
        self.pool.lock().live.contains(&pid.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn small(min: u64, max: u64) -> PidAllocator {
        PidAllocator::new(&LifecycleConfig {
            pid_min: min,
            pid_max: max,
            ..LifecycleConfig::default()
        })
    }

    #[test]
    fn test_allocates_cyclically_from_min() {
        let pids = small(2, 4);
        let a = pids.allocate().unwrap();
        let b = pids.allocate().unwrap();
        assert_eq!(a.pid(), ProcessId(2));
        assert_eq!(b.pid(), ProcessId(3));

        drop(a);
        // Cursor keeps moving forward before wrapping
        let c = pids.allocate().unwrap();
        assert_eq!(c.pid(), ProcessId(4));
        let d = pids.allocate().unwrap();
        assert_eq!(d.pid(), ProcessId(2));
    }

    #[test]
    fn test_exhaustion_is_eagain() {
        let pids = small(1, 2);
        let _a = pids.allocate().unwrap();
        let _b = pids.allocate().unwrap();
        let err = pids.allocate().unwrap_err();
        assert_eq!(err, ProcError::PidsExhausted);
        assert_eq!(err.errno(), crate::error::errno::EAGAIN);
    }

    #[test]
    fn test_pid_held_until_every_clone_dropped() {
        let pids = small(1, 1);
        let token = pids.allocate().unwrap();
        let slot_copy = Arc::clone(&token);

        drop(token);
        assert!(pids.is_reserved(ProcessId(1)));
        assert!(pids.allocate().is_err());

        drop(slot_copy);
        assert!(!pids.is_reserved(ProcessId(1)));
        assert_eq!(pids.allocate().unwrap().pid(), ProcessId(1));
    }

    #[test]
    fn test_kernel_pid_never_handed_out() {
        let pids = small(0, 3);
        let all: Vec<_> = (0..3).map(|_| pids.allocate().unwrap()).collect();
        assert!(all.iter().all(|t| t.pid() != ProcessId::KERNEL));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Live pids are always distinct, whatever the allocate/release mix.
        #[test]
        fn prop_live_pids_unique(ops in proptest::collection::vec(any::<(bool, u8)>(), 1..200)) {
            let pids = small(1, 16);
            let mut held: Vec<Arc<PidToken>> = Vec::new();

            for (alloc, pick) in ops {
                if alloc || held.is_empty() {
                    match pids.allocate() {
                        Ok(t) => held.push(t),
                        Err(e) => prop_assert_eq!(held.len(), 16, "spurious {}", e),
                    }
                } else {
                    let idx = pick as usize % held.len();
                    held.swap_remove(idx);
                }

                let mut seen: Vec<u64> = held.iter().map(|t| t.pid().as_u64()).collect();
                seen.sort_unstable();
                seen.dedup();
                prop_assert_eq!(seen.len(), held.len());
                prop_assert_eq!(pids.in_use(), held.len());
            }
        }
    }
}
