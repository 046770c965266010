//! Unsynchronized sequence.
//!
//! The write path reads the length, stores into that slot and writes the
//! length back as three separate steps, the same shape as an unguarded
//! `list.add()`. Two writers that read the same length overwrite each
//! other's slot and one update is lost. Every step is an atomic access, so
//! the race loses data without undefined behaviour.
//!
//! Storage is a fixed block of slots. Running out of slots is this
//! strategy's analogue of a failed structural resize and is reported as
//! `WriteError::CapacityExceeded`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use cmh_core::{ContainerSnapshot, SharedContainer, Strategy, WriteError};

/// Upper bound on preallocated slots.
const SLOTS_COUNT_MAX: usize = 1 << 22;

/// Sequence with no write synchronization. Loses updates under contention.
pub struct RacyVec {
    slots: Box<[AtomicU64]>,
    len: AtomicUsize,
}

impl RacyVec {
    /// Create a vector with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(SLOTS_COUNT_MAX);
        Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of slots available.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append without synchronization.
    pub fn push(&self, value: u64) -> Result<(), WriteError> {
        // Non-atomic read-modify-write: concurrent pushes may read the same len.
        let len = self.len.load(Ordering::Relaxed);
        let slot = self.slots.get(len).ok_or(WriteError::CapacityExceeded {
            capacity: self.slots.len(),
        })?;
        slot.store(value, Ordering::Relaxed);
        self.len.store(len + 1, Ordering::Relaxed);
        Ok(())
    }

    /// Current contents. Only consistent once writers have stopped.
    #[must_use]
    pub fn get_contents(&self) -> Vec<u64> {
        let len = self.len.load(Ordering::Acquire);
        self.slots[..len]
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .collect()
    }
}

impl SharedContainer for RacyVec {
    fn strategy(&self) -> Strategy {
        Strategy::Unsynchronized
    }

    fn append(&self, value: u64) -> Result<(), WriteError> {
        self.push(value)
    }

    fn size(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> ContainerSnapshot {
        ContainerSnapshot::Sequence(self.get_contents())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_single_writer_keeps_everything() {
        let v = RacyVec::with_capacity(100);
        for i in 0..100 {
            v.push(i).unwrap();
        }
        assert_eq!(v.size(), 100);
        assert_eq!(v.get_contents(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_storage_reports_capacity_fault() {
        let v = RacyVec::with_capacity(2);
        v.push(1).unwrap();
        v.push(2).unwrap();
        assert_eq!(v.push(3), Err(WriteError::CapacityExceeded { capacity: 2 }));
        assert_eq!(v.size(), 2);
    }

    #[test]
    fn test_map_operation_unsupported() {
        let v = RacyVec::with_capacity(1);
        assert!(matches!(v.put(1, 1), Err(WriteError::Unsupported { op: "put", .. })));
    }

    #[test]
    fn test_concurrent_writers_never_exceed_attempted() {
        let v = RacyVec::with_capacity(4000);
        thread::scope(|s| {
            for t in 0..4u64 {
                let v = &v;
                s.spawn(move || {
                    for i in 0..1000 {
                        v.push(t * 1000 + i).unwrap();
                    }
                });
            }
        });

        // Lost updates are allowed; growth past the attempted count is not.
        let contents = v.get_contents();
        assert!(contents.len() <= 4000);
        assert_eq!(contents.len(), v.size());
        assert!(contents.iter().all(|&x| x < 4000));
    }
}
