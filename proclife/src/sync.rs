//! Condition variable for `spin::Mutex`
//!
//! `spin` has no condition variable, so waiting is built on a generation
//! counter: a waiter samples the generation while holding the lock, releases
//! the lock and relaxes until a notifier (which must hold the same lock)
//! bumps the generation. Sampling and bumping both happen under the lock, so
//! a notification issued after the waiter released the lock is never lost.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use spin::{Mutex, MutexGuard};

/// Condition variable
pub struct Condvar {
    generation: AtomicU64,
    waiters: AtomicUsize,
}

impl Condvar {
    pub const fn new() -> Self {
        Condvar {
            generation: AtomicU64::new(0),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Block until notified.
    ///
    /// `guard` must be a guard of `lock`. The lock is released while
    /// waiting; `relax` runs on every poll (the scheduler's yield in a
    /// kernel, `std::thread::yield_now` in tests). The lock is held again
    /// when this returns. Wakeups may be spurious, so callers re-check their
    /// condition, see [`Condvar::wait_while`].
    pub fn wait<'a, T, R>(
        &self,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        mut relax: R,
    ) -> MutexGuard<'a, T>
    where
        R: FnMut(),
    {
        let seen = self.generation.load(Ordering::Acquire);
        self.waiters.fetch_add(1, Ordering::AcqRel);
        drop(guard);

        while self.generation.load(Ordering::Acquire) == seen {
            relax();
            core::hint::spin_loop();
        }

        self.waiters.fetch_sub(1, Ordering::AcqRel);
        lock.lock()
    }

    /// Block while `condition` holds for the protected data.
    pub fn wait_while<'a, T, C, R>(
        &self,
        lock: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        mut condition: C,
        mut relax: R,
    ) -> MutexGuard<'a, T>
    where
        C: FnMut(&mut T) -> bool,
        R: FnMut(),
    {
        while condition(&mut *guard) {
            guard = self.wait(lock, guard, &mut relax);
        }
        guard
    }

    /// Wake every waiter.
    ///
    /// Takes the guard of the associated lock as proof that the caller holds
    /// it. Returns the number of contexts that were waiting.
    pub fn notify_all<T>(&self, _held: &MutexGuard<'_, T>) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.waiters.load(Ordering::Acquire)
    }

    /// Number of contexts currently blocked in [`Condvar::wait`]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Condvar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Condvar")
            .field("waiters", &self.waiters())
            .finish()
    }
}
