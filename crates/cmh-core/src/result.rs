//! Run result types.

use std::time::Duration;

use serde::Serialize;

use crate::container::ContainerSnapshot;
use crate::error::{RunFault, WriteError};
use crate::pattern::KeyPattern;
use crate::strategy::Strategy;

/// What one writer task did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    /// Task index within its run
    pub task_id: usize,
    /// Writes that returned success
    pub writes_completed: u64,
    /// Whether the task performed every write it was given
    pub finished: bool,
    /// Error that stopped the task, if any
    pub error: Option<WriteError>,
    /// Time from the start gate opening to the task exiting
    pub elapsed: Duration,
}

/// Final state of one run. Produced once by the harness, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Strategy the container used
    pub strategy: Strategy,
    /// Keys the tasks wrote
    pub key_pattern: KeyPattern,
    /// Number of writer tasks
    pub tasks: usize,
    /// Writes each task was asked to perform
    pub iterations_per_task: u64,
    /// Container size after every task joined
    pub final_size: usize,
    /// Size a complete, correct run reaches
    pub expected_size: usize,
    /// Wall-clock time from the start gate to the last task joining
    pub elapsed: Duration,
    /// Whether the run hit a timeout or a write fault
    pub faulted: bool,
    /// First fault, if any
    pub fault: Option<RunFault>,
    /// Compare-and-swap retries spent by writers
    pub contention_retries: u64,
    /// Per-task outcomes, ordered by task id
    pub task_outcomes: Vec<TaskOutcome>,
    /// Container contents after the run
    #[serde(skip)]
    pub contents: ContainerSnapshot,
}

impl RunResult {
    /// Writes the run was asked to perform.
    #[must_use]
    pub fn total_writes(&self) -> u64 {
        self.tasks as u64 * self.iterations_per_task
    }

    /// Writes that returned success, across all tasks.
    #[must_use]
    pub fn writes_completed(&self) -> u64 {
        self.task_outcomes.iter().map(|t| t.writes_completed).sum()
    }

    /// Write errors absorbed without faulting the run.
    #[must_use]
    pub fn tolerated_errors(&self) -> usize {
        if self.strategy.tolerates_write_errors() {
            self.task_outcomes.iter().filter(|t| t.error.is_some()).count()
        } else {
            0
        }
    }

    /// Whether the run ended because of its timeout.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self.fault, Some(RunFault::Timeout { .. }))
    }

    /// Single-line summary followed by the fault, if any.
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.faulted { "FAULT" } else { "DONE" };
        let mut out = format!(
            "[{}] strategy={} keys={} tasks={} iterations={} size={}/{} elapsed={:.2}ms retries={}",
            status,
            self.strategy,
            self.key_pattern,
            self.tasks,
            self.iterations_per_task,
            self.final_size,
            self.expected_size,
            self.elapsed.as_secs_f64() * 1000.0,
            self.contention_retries,
        );
        if let Some(ref fault) = self.fault {
            out.push_str(&format!("\n  {}: {}", fault.condition(), fault));
        }
        out
    }
}
