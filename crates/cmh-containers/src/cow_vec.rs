//! Copy-on-write sequence.
//!
//! Every append builds a fresh copy of the whole backing vector with the new
//! element added and publishes it with a single compare-and-swap on the
//! root pointer. A writer that loses the race rebuilds from the newer copy
//! and tries again, so no append is lost and no writer ever blocks.
//!
//! Readers pin an epoch and read whichever copy is current without locking.
//! Replaced copies are reclaimed through crossbeam-epoch once no reader can
//! still hold them.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned};

use cmh_core::{ContainerSnapshot, SharedContainer, Strategy, WriteError};

/// Sequence whose every write swaps in a new full copy.
pub struct CowVec {
    /// Current copy. Never null.
    data: Atomic<Vec<u64>>,
    /// Failed swaps across all writers
    retries: AtomicU64,
}

impl CowVec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Atomic::new(Vec::new()),
            retries: AtomicU64::new(0),
        }
    }

    /// Append by publishing a copy that ends with `value`.
    pub fn push(&self, value: u64) {
        let guard = epoch::pin();

        loop {
            let current = self.data.load(Ordering::Acquire, &guard);
            // Safety: the root is never null and the copy it points to is only
            // destroyed after every guard that could see it is dropped.
            let old = unsafe { current.deref() };

            let mut next = Vec::with_capacity(old.len() + 1);
            next.extend_from_slice(old);
            next.push(value);

            match self.data.compare_exchange(
                current,
                Owned::new(next),
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    // Safety: `current` is unlinked; later loads cannot reach it.
                    unsafe {
                        guard.defer_destroy(current);
                    }
                    return;
                }
                Err(_) => {
                    // Another writer published first; rebuild from its copy.
                    self.retries.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Number of elements in the current copy.
    #[must_use]
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        // Safety: never null, protected by the guard.
        unsafe { self.data.load(Ordering::Acquire, &guard).deref() }.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the current copy. Safe to call while writers are running.
    #[must_use]
    pub fn get_contents(&self) -> Vec<u64> {
        let guard = epoch::pin();
        // Safety: never null, protected by the guard.
        unsafe { self.data.load(Ordering::Acquire, &guard).deref() }.clone()
    }
}

impl Default for CowVec {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedContainer for CowVec {
    fn strategy(&self) -> Strategy {
        Strategy::CopyOnWrite
    }

    fn append(&self, value: u64) -> Result<(), WriteError> {
        self.push(value);
        Ok(())
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn snapshot(&self) -> ContainerSnapshot {
        ContainerSnapshot::Sequence(self.get_contents())
    }

    fn contention_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

impl Drop for CowVec {
    fn drop(&mut self) {
        // Safety: `&mut self` means no other thread can reach the root.
        unsafe {
            let guard = epoch::unprotected();
            let current = self.data.load(Ordering::Relaxed, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}
