//! Writer tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use cmh_core::{value_for_key, ContainerKind, KeyPattern, SharedContainer, TaskOutcome, WriteError};

/// A task that performs a fixed number of sequential writes.
///
/// Sequence containers receive `append(key)`; the map receives
/// `put(key, value_for_key(key))`.
#[derive(Debug, Clone)]
pub struct WriterTask {
    id: usize,
    iterations: u64,
    pattern: KeyPattern,
    /// Visiting order for the shuffled pattern
    order: Option<Vec<u64>>,
}

impl WriterTask {
    #[must_use]
    pub fn new(id: usize, iterations: u64, pattern: KeyPattern) -> Self {
        let order = match pattern {
            KeyPattern::Shuffled { seed } => {
                let mut keys: Vec<u64> = (0..iterations).collect();
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(id as u64));
                keys.shuffle(&mut rng);
                Some(keys)
            }
            KeyPattern::Disjoint | KeyPattern::Overlapping => None,
        };
        Self {
            id,
            iterations,
            pattern,
            order,
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Key written at `step`.
    #[must_use]
    pub fn key_at(&self, step: u64) -> u64 {
        debug_assert!(step < self.iterations, "step {} out of range", step);
        match &self.order {
            Some(order) => order[step as usize],
            None => self.pattern.offset(self.id, self.iterations) + step,
        }
    }

    fn write(&self, container: &dyn SharedContainer, key: u64) -> Result<(), WriteError> {
        match container.strategy().kind() {
            ContainerKind::Sequence => container.append(key),
            ContainerKind::Map => container.put(key, value_for_key(key)),
        }
    }

    /// Perform every write, stopping early when `stop` is raised or a write fails.
    ///
    /// `stop` is checked between writes, never during one. `started` is the
    /// instant the run's start gate opened. `progress` holds the count of
    /// successful writes after each one, so it stays accurate if a write panics.
    pub fn run(
        &self,
        container: &dyn SharedContainer,
        stop: &AtomicBool,
        progress: &AtomicU64,
        started: Instant,
    ) -> TaskOutcome {
        let mut writes_completed = 0u64;
        let mut error = None;

        for step in 0..self.iterations {
            if stop.load(Ordering::Acquire) {
                break;
            }
            match self.write(container, self.key_at(step)) {
                Ok(()) => {
                    writes_completed += 1;
                    progress.store(writes_completed, Ordering::Relaxed);
                }
                Err(e) => {
                    if container.strategy().tolerates_write_errors() {
                        log::warn!(
                            "task {} ({}): write failed after {} writes, tolerated: {}",
                            self.id,
                            container.strategy(),
                            writes_completed,
                            e
                        );
                    } else {
                        log::error!(
                            "task {} ({}): write fault after {} writes: {}",
                            self.id,
                            container.strategy(),
                            writes_completed,
                            e
                        );
                    }
                    error = Some(e);
                    break;
                }
            }
        }

        let outcome = TaskOutcome {
            task_id: self.id,
            writes_completed,
            finished: writes_completed == self.iterations,
            error,
            elapsed: started.elapsed(),
        };
        log::debug!(
            "task {} ({}): {} of {} writes in {:?}",
            self.id,
            container.strategy(),
            outcome.writes_completed,
            self.iterations,
            outcome.elapsed
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use cmh_containers::{LockFreeMap, MutexVec, RacyVec};
    use cmh_core::ContainerSnapshot;

    use super::*;

    #[test]
    fn test_disjoint_keys_offset_by_task() {
        let task = WriterTask::new(2, 100, KeyPattern::Disjoint);
        assert_eq!(task.key_at(0), 200);
        assert_eq!(task.key_at(99), 299);
    }

    #[test]
    fn test_shuffled_is_a_seeded_permutation() {
        let a = WriterTask::new(0, 500, KeyPattern::Shuffled { seed: 9 });
        let b = WriterTask::new(0, 500, KeyPattern::Shuffled { seed: 9 });
        let c = WriterTask::new(1, 500, KeyPattern::Shuffled { seed: 9 });

        let keys_a: Vec<u64> = (0..500).map(|i| a.key_at(i)).collect();
        let keys_b: Vec<u64> = (0..500).map(|i| b.key_at(i)).collect();
        let keys_c: Vec<u64> = (0..500).map(|i| c.key_at(i)).collect();

        assert_eq!(keys_a, keys_b);
        assert_ne!(keys_a, keys_c);
        assert_eq!(keys_a.iter().copied().collect::<HashSet<_>>().len(), 500);
        assert!(keys_a.iter().all(|&k| k < 500));
    }

    #[test]
    fn test_run_appends_to_sequence() {
        let container = MutexVec::default();
        let task = WriterTask::new(1, 10, KeyPattern::Disjoint);
        let outcome = task.run(
            &container,
            &AtomicBool::new(false),
            &AtomicU64::new(0),
            Instant::now(),
        );

        assert!(outcome.finished);
        assert_eq!(outcome.writes_completed, 10);
        assert_eq!(
            container.snapshot(),
            ContainerSnapshot::Sequence((10..20).collect())
        );
    }

    #[test]
    fn test_run_puts_into_map() {
        let container = LockFreeMap::with_buckets(8);
        let task = WriterTask::new(0, 50, KeyPattern::Overlapping);
        let outcome = task.run(
            &container,
            &AtomicBool::new(false),
            &AtomicU64::new(0),
            Instant::now(),
        );

        assert!(outcome.finished);
        assert_eq!(container.size(), 50);
        assert_eq!(container.get(49), Some(value_for_key(49)));
    }

    #[test]
    fn test_progress_tracks_successful_writes() {
        let container = RacyVec::with_capacity(7);
        let progress = AtomicU64::new(0);
        let task = WriterTask::new(0, 10, KeyPattern::Disjoint);
        let outcome = task.run(&container, &AtomicBool::new(false), &progress, Instant::now());

        assert_eq!(outcome.writes_completed, 7);
        assert_eq!(progress.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_raised_stop_prevents_writes() {
        let container = MutexVec::default();
        let task = WriterTask::new(0, 10, KeyPattern::Disjoint);
        let outcome = task.run(
            &container,
            &AtomicBool::new(true),
            &AtomicU64::new(0),
            Instant::now(),
        );

        assert!(!outcome.finished);
        assert_eq!(outcome.writes_completed, 0);
        assert_eq!(container.size(), 0);
    }

    #[test]
    fn test_write_error_stops_task_and_is_recorded() {
        let container = RacyVec::with_capacity(3);
        let task = WriterTask::new(0, 10, KeyPattern::Disjoint);
        let outcome = task.run(
            &container,
            &AtomicBool::new(false),
            &AtomicU64::new(0),
            Instant::now(),
        );

        assert_eq!(outcome.writes_completed, 3);
        assert!(!outcome.finished);
        assert_eq!(outcome.error, Some(WriteError::CapacityExceeded { capacity: 3 }));
    }
}
