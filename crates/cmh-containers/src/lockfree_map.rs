//! Lock-free hash map.
//!
//! A fixed array of buckets, each the head of an insert-only linked list of
//! entries. A `put` scans its bucket; an existing key has its value replaced
//! with an atomic swap, a missing key is prepended with one
//! compare-and-swap on the bucket head. When that CAS fails the bucket is
//! rescanned from the new head, so a key inserted concurrently by another
//! writer is found and updated instead of being inserted twice.
//!
//! Contention stays local to a bucket; there is no global lock. Same-key
//! writes are last-write-wins with no ordering between writers.
//!
//! Entries are never removed while the map is alive, so a pinned guard is
//! enough to traverse and nothing is reclaimed until `Drop`.

use std::collections::hash_map::RandomState;
use std::collections::BTreeMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};

use cmh_core::{ContainerSnapshot, SharedContainer, Strategy, WriteError};

const BUCKETS_COUNT_MIN: usize = 16;
const BUCKETS_COUNT_MAX: usize = 1 << 16;

/// Lock-free map from `u64` keys to `u64` values.
pub struct LockFreeMap {
    buckets: Box<[Atomic<Entry>]>,
    len: AtomicUsize,
    retries: AtomicU64,
    hasher: RandomState,
}

struct Entry {
    key: u64,
    value: AtomicU64,
    next: Atomic<Entry>,
}

impl LockFreeMap {
    /// Map sized for roughly `capacity` distinct keys.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let buckets = (capacity / 4).clamp(BUCKETS_COUNT_MIN, BUCKETS_COUNT_MAX);
        Self::with_buckets(buckets)
    }

    /// Map with `count` buckets, rounded up to a power of two.
    #[must_use]
    pub fn with_buckets(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        Self {
            buckets: (0..count).map(|_| Atomic::null()).collect(),
            len: AtomicUsize::new(0),
            retries: AtomicU64::new(0),
            hasher: RandomState::new(),
        }
    }

    /// Number of buckets.
    #[must_use]
    pub fn buckets_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket(&self, key: u64) -> &Atomic<Entry> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.buckets[hash & (self.buckets.len() - 1)]
    }

    fn find<'g>(mut current: Shared<'g, Entry>, key: u64, guard: &'g Guard) -> Option<&'g Entry> {
        // Safety: entries are never unlinked while the map is shared.
        while let Some(entry) = unsafe { current.as_ref() } {
            if entry.key == key {
                return Some(entry);
            }
            current = entry.next.load(Ordering::Acquire, guard);
        }
        None
    }

    /// Insert or overwrite `key`. Returns the previous value, if any.
    pub fn insert(&self, key: u64, value: u64) -> Option<u64> {
        let guard = epoch::pin();
        let bucket = self.bucket(key);
        let mut pending: Option<Owned<Entry>> = None;

        loop {
            let head = bucket.load(Ordering::Acquire, &guard);

            if let Some(entry) = Self::find(head, key, &guard) {
                return Some(entry.value.swap(value, Ordering::AcqRel));
            }

            let node = pending.take().unwrap_or_else(|| {
                Owned::new(Entry {
                    key,
                    value: AtomicU64::new(value),
                    next: Atomic::null(),
                })
            });
            node.next.store(head, Ordering::Relaxed);

            match bucket.compare_exchange(head, node, Ordering::AcqRel, Ordering::Acquire, &guard) {
                Ok(_) => {
                    self.len.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Err(e) => {
                    // Bucket changed under us; the key may now exist.
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    pending = Some(e.new);
                }
            }
        }
    }

    /// Current value for `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<u64> {
        let guard = epoch::pin();
        let head = self.bucket(key).load(Ordering::Acquire, &guard);
        Self::find(head, key, &guard).map(|e| e.value.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by key.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<u64, u64> {
        let guard = epoch::pin();
        let mut out = BTreeMap::new();
        for bucket in self.buckets.iter() {
            let mut current = bucket.load(Ordering::Acquire, &guard);
            // Safety: see `find`.
            while let Some(entry) = unsafe { current.as_ref() } {
                out.insert(entry.key, entry.value.load(Ordering::Acquire));
                current = entry.next.load(Ordering::Acquire, &guard);
            }
        }
        out
    }
}

impl SharedContainer for LockFreeMap {
    fn strategy(&self) -> Strategy {
        Strategy::LockFreeMap
    }

    fn put(&self, key: u64, value: u64) -> Result<(), WriteError> {
        self.insert(key, value);
        Ok(())
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn snapshot(&self) -> ContainerSnapshot {
        ContainerSnapshot::Map(self.entries())
    }

    fn contention_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

impl Drop for LockFreeMap {
    fn drop(&mut self) {
        // Safety: `&mut self` means no other thread can reach any entry.
        unsafe {
            let guard = epoch::unprotected();
            for bucket in self.buckets.iter() {
                let mut current = bucket.load(Ordering::Relaxed, guard);
                while !current.is_null() {
                    let entry = current.into_owned();
                    current = entry.next.load(Ordering::Relaxed, guard);
                    drop(entry);
                }
            }
        }
    }
}
