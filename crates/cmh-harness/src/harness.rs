//! Concurrent run harness.
//!
//! A run owns one container per lane and spawns one OS thread per writer
//! task inside a thread scope, so no task can outlive the run:
//!
//! ```text
//!   spawn all tasks ──> open start gate ──> wait for done signals
//!                                              │          │
//!                                           all done   deadline
//!                                              │          │
//!                                              │    raise stop flag
//!                                              ▼          ▼
//!                                     join every task, snapshot containers
//! ```
//!
//! Tasks observe the stop flag between writes, so a timed-out run still
//! joins promptly and reports whatever the containers hold.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use cmh_core::{
    ConfigError, KeyPattern, RunFault, RunResult, SharedContainer, Strategy, TaskOutcome,
    WriteError,
};

use crate::config::HarnessConfig;
use crate::writer::WriterTask;

/// Errors that prevent a run from producing a result.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn writer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// One container and the tasks that write to it.
pub struct Lane {
    container: Box<dyn SharedContainer>,
    tasks: usize,
    iterations_per_task: u64,
    key_pattern: KeyPattern,
}

impl Lane {
    /// Lane with a fresh container for `strategy`.
    pub fn new(strategy: Strategy, config: &HarnessConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let key_pattern = config.key_pattern_for(strategy);
        let capacity = key_pattern.expected_size(strategy, config.tasks, config.iterations_per_task);
        Ok(Self {
            container: cmh_containers::build(strategy, capacity),
            tasks: config.tasks,
            iterations_per_task: config.iterations_per_task,
            key_pattern,
        })
    }

    /// Lane around a caller-supplied container.
    pub fn with_container(
        container: Box<dyn SharedContainer>,
        config: &HarnessConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let key_pattern = config.key_pattern_for(container.strategy());
        Ok(Self {
            container,
            tasks: config.tasks,
            iterations_per_task: config.iterations_per_task,
            key_pattern,
        })
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.container.strategy()
    }

    /// Size a complete, correct run of this lane reaches.
    #[must_use]
    pub fn expected_size(&self) -> usize {
        self.key_pattern
            .expected_size(self.strategy(), self.tasks, self.iterations_per_task)
    }
}

/// Releases every writer at once.
struct StartGate {
    opened: Mutex<Option<Instant>>,
    cond: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            opened: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Open the gate and return the instant it opened.
    fn open(&self) -> Instant {
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        let at = *opened.get_or_insert_with(Instant::now);
        self.cond.notify_all();
        at
    }

    /// Block until the gate opens.
    fn wait(&self) -> Instant {
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(at) = *opened {
                return at;
            }
            opened = self
                .cond
                .wait(opened)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Signals task completion when dropped, including on panic.
struct DoneSignal {
    lane: usize,
    tx: Sender<usize>,
}

impl Drop for DoneSignal {
    fn drop(&mut self) {
        let _ = self.tx.send(self.lane);
    }
}

/// Runs writer tasks against shared containers under one timeout.
#[derive(Debug, Clone)]
pub struct Harness {
    timeout: Duration,
}

impl Harness {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a single lane.
    pub fn run(&self, lane: Lane) -> Result<RunResult, HarnessError> {
        let mut results = self.run_side_by_side(vec![lane])?;
        Ok(results.remove(0))
    }

    /// Run several lanes at once: every task of every lane starts at the
    /// same gate and shares the deadline. Returns one result per lane, in
    /// order.
    pub fn run_side_by_side(&self, lanes: Vec<Lane>) -> Result<Vec<RunResult>, HarnessError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::NotPositive { field: "timeout" }.into());
        }
        if lanes.is_empty() {
            return Err(ConfigError::NotPositive { field: "lanes" }.into());
        }

        let tasks: Vec<(usize, WriterTask)> = lanes
            .iter()
            .enumerate()
            .flat_map(|(lane_idx, lane)| {
                (0..lane.tasks).map(move |id| {
                    (
                        lane_idx,
                        WriterTask::new(id, lane.iterations_per_task, lane.key_pattern),
                    )
                })
            })
            .collect();

        let stop = AtomicBool::new(false);
        let progress: Vec<AtomicU64> = tasks.iter().map(|_| AtomicU64::new(0)).collect();
        let gate = StartGate::new();
        let (done_tx, done_rx) = mpsc::channel::<usize>();

        let joined = thread::scope(|s| -> Result<_, HarnessError> {
            let mut handles = Vec::with_capacity(tasks.len());

            for ((lane_idx, task), progress) in tasks.into_iter().zip(&progress) {
                let container: &dyn SharedContainer = lanes[lane_idx].container.as_ref();
                let task_id = task.id();
                let signal = DoneSignal {
                    lane: lane_idx,
                    tx: done_tx.clone(),
                };
                let (stop, gate) = (&stop, &gate);

                let spawned = thread::Builder::new()
                    .name(format!("writer-{}-{}", container.strategy(), task_id))
                    .spawn_scoped(s, move || {
                        let _signal = signal;
                        let started = gate.wait();
                        task.run(container, stop, progress, started)
                    });

                match spawned {
                    Ok(handle) => handles.push((lane_idx, task_id, progress, handle)),
                    Err(e) => {
                        // Release the tasks already waiting; they exit on the stop flag.
                        stop.store(true, Ordering::Release);
                        gate.open();
                        return Err(HarnessError::Spawn(e));
                    }
                }
            }
            drop(done_tx);

            let started = gate.open();
            let deadline = started + self.timeout;
            let mut unfinished: Vec<usize> = lanes.iter().map(|l| l.tasks).collect();
            let mut remaining = handles.len();
            let mut timed_out = false;

            log::debug!("started {} writer task(s) in {} lane(s)", remaining, lanes.len());

            while remaining > 0 {
                let wait = deadline.saturating_duration_since(Instant::now());
                match done_rx.recv_timeout(wait) {
                    Ok(lane_idx) => {
                        unfinished[lane_idx] -= 1;
                        remaining -= 1;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        timed_out = true;
                        stop.store(true, Ordering::Release);
                        log::warn!(
                            "timeout after {:?}: stopping {} unfinished task(s)",
                            self.timeout,
                            remaining
                        );
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            let outcomes: Vec<(usize, TaskOutcome)> = handles
                .into_iter()
                .map(|(lane_idx, task_id, progress, handle)| {
                    let outcome = handle.join().unwrap_or_else(|payload| {
                        let writes_completed = progress.load(Ordering::Relaxed);
                        panicked_outcome(task_id, payload, writes_completed, started)
                    });
                    (lane_idx, outcome)
                })
                .collect();

            Ok((started, outcomes, timed_out.then_some(unfinished)))
        })?;

        let (started, outcomes, unfinished_at_timeout) = joined;
        let total_elapsed = started.elapsed();

        let results = lanes
            .iter()
            .enumerate()
            .map(|(lane_idx, lane)| {
                let task_outcomes: Vec<TaskOutcome> = outcomes
                    .iter()
                    .filter(|(idx, _)| *idx == lane_idx)
                    .map(|(_, outcome)| outcome.clone())
                    .collect();
                let unfinished = unfinished_at_timeout
                    .as_ref()
                    .map_or(0, |counts| counts[lane_idx]);
                self.build_result(lane, task_outcomes, unfinished, total_elapsed)
            })
            .collect();

        Ok(results)
    }

    fn build_result(
        &self,
        lane: &Lane,
        task_outcomes: Vec<TaskOutcome>,
        unfinished_at_timeout: usize,
        total_elapsed: Duration,
    ) -> RunResult {
        let strategy = lane.strategy();

        let write_fault = if strategy.tolerates_write_errors() {
            None
        } else {
            task_outcomes
                .iter()
                .filter_map(|t| t.error.as_ref().map(|e| (t.elapsed, t.task_id, e)))
                .min_by_key(|(elapsed, _, _)| *elapsed)
                .map(|(_, task_id, source)| RunFault::WriteFault {
                    task_id,
                    source: source.clone(),
                })
        };
        let timeout = (unfinished_at_timeout > 0).then(|| RunFault::Timeout {
            timeout: self.timeout,
            unfinished_tasks: unfinished_at_timeout,
        });
        let fault = write_fault.or(timeout);

        let elapsed = task_outcomes
            .iter()
            .map(|t| t.elapsed)
            .max()
            .unwrap_or(total_elapsed);

        let result = RunResult {
            strategy,
            key_pattern: lane.key_pattern,
            tasks: lane.tasks,
            iterations_per_task: lane.iterations_per_task,
            final_size: lane.container.size(),
            expected_size: lane.expected_size(),
            elapsed,
            faulted: fault.is_some(),
            fault,
            contention_retries: lane.container.contention_retries(),
            task_outcomes,
            contents: lane.container.snapshot(),
        };

        if result.faulted {
            log::warn!("{}", result.format());
        } else {
            log::info!("{}", result.format());
        }
        result
    }
}

/// Outcome of a task whose write panicked after `writes_completed` successful writes.
fn panicked_outcome(
    task_id: usize,
    payload: Box<dyn Any + Send>,
    writes_completed: u64,
    started: Instant,
) -> TaskOutcome {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    log::error!(
        "task {} panicked after {} writes: {}",
        task_id,
        writes_completed,
        message
    );

    TaskOutcome {
        task_id,
        writes_completed,
        finished: false,
        error: Some(WriteError::Panicked(message)),
        elapsed: started.elapsed(),
    }
}

/// Run `tasks` writers of `iterations_per_task` writes each against a fresh
/// container for `strategy`, with the strategy's default key pattern.
pub fn run(
    strategy: Strategy,
    tasks: usize,
    iterations_per_task: u64,
    timeout: Duration,
) -> Result<RunResult, HarnessError> {
    let config = HarnessConfig {
        tasks,
        iterations_per_task,
        timeout,
        key_pattern: None,
    };
    let lane = Lane::new(strategy, &config)?;
    Harness::new(timeout).run(lane)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_gate_releases_waiters() {
        let gate = StartGate::new();
        let opened = thread::scope(|s| {
            let waiter = s.spawn(|| gate.wait());
            let opened = gate.open();
            assert_eq!(waiter.join().unwrap(), opened);
            opened
        });
        // Opening twice keeps the first instant.
        assert_eq!(gate.open(), opened);
    }

    #[test]
    fn test_empty_lane_list_rejected() {
        let err = Harness::new(Duration::from_secs(1))
            .run_side_by_side(Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::NotPositive { field: "lanes" })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected_before_spawning() {
        let lane = Lane::new(Strategy::MutexWrapped, &HarnessConfig::quick()).unwrap();
        let err = Harness::new(Duration::ZERO).run(lane).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::NotPositive { field: "timeout" })
        ));
    }

    #[test]
    fn test_quick_run_completes() {
        let result = run(Strategy::CopyOnWrite, 2, 100, Duration::from_secs(5)).unwrap();
        assert!(!result.faulted);
        assert_eq!(result.final_size, 200);
        assert_eq!(result.task_outcomes.len(), 2);
        assert!(result.task_outcomes.iter().all(|t| t.finished));
    }
}
