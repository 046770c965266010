//! Lock-wrapped sequence: every append holds one exclusive lock.

use std::sync::{Mutex, PoisonError};

use cmh_core::{ContainerSnapshot, SharedContainer, Strategy, WriteError};

/// Upper bound on elements reserved up front; the vector grows past it on demand.
const PREALLOC_COUNT_MAX: usize = 1 << 20;

/// Sequence whose writes are serialized by a single mutex.
#[derive(Debug, Default)]
pub struct MutexVec {
    values: Mutex<Vec<u64>>,
}

impl MutexVec {
    /// Vector reserving room for up to `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Mutex::new(Vec::with_capacity(capacity.min(PREALLOC_COUNT_MAX))),
        }
    }

    /// Append under the lock. A poisoned lock is reported, not recovered.
    pub fn push(&self, value: u64) -> Result<(), WriteError> {
        self.values
            .lock()
            .map_err(|_| WriteError::Poisoned)?
            .push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SharedContainer for MutexVec {
    fn strategy(&self) -> Strategy {
        Strategy::MutexWrapped
    }

    fn append(&self, value: u64) -> Result<(), WriteError> {
        self.push(value)
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn snapshot(&self) -> ContainerSnapshot {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        ContainerSnapshot::Sequence(values.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_concurrent_appends_all_land() {
        let v = MutexVec::default();
        thread::scope(|s| {
            for t in 0..2u64 {
                let v = &v;
                s.spawn(move || {
                    for i in 0..1000 {
                        v.push(t * 1000 + i).unwrap();
                    }
                });
            }
        });
        assert_eq!(v.size(), 2000);

        let ContainerSnapshot::Sequence(mut values) = v.snapshot() else {
            panic!("expected a sequence snapshot");
        };
        values.sort_unstable();
        assert_eq!(values, (0..2000).collect::<Vec<_>>());
    }

    #[test]
    fn test_huge_capacity_reserves_a_bounded_amount() {
        let v = MutexVec::with_capacity(usize::MAX / 8);
        assert!(v.values.lock().unwrap().capacity() <= PREALLOC_COUNT_MAX);
        v.push(1).unwrap();
        assert_eq!(v.size(), 1);
    }

    #[test]
    fn test_poisoned_lock_is_a_write_error() {
        let v = MutexVec::default();
        v.push(7).unwrap();

        let _ = thread::scope(|s| {
            s.spawn(|| {
                let _guard = v.values.lock().unwrap();
                panic!("writer dies holding the lock");
            })
            .join()
        });

        assert_eq!(v.push(8), Err(WriteError::Poisoned));
        // Reads still see the data written before the panic.
        assert_eq!(v.size(), 1);
    }
}
