//! Error types.

use std::time::Duration;

use serde::Serialize;

use crate::strategy::Strategy;

/// A single write into a shared container failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum WriteError {
    #[error("storage exhausted at {capacity} elements")]
    CapacityExceeded { capacity: usize },

    #[error("lock poisoned by a panicking writer")]
    Poisoned,

    #[error("{strategy} container does not support {op}")]
    Unsupported { op: &'static str, strategy: Strategy },

    #[error("writer panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Why a run is reported as faulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum RunFault {
    /// The join phase outlived the run's timeout.
    #[error("timed out after {timeout:?} with {unfinished_tasks} task(s) unfinished")]
    Timeout {
        timeout: Duration,
        unfinished_tasks: usize,
    },

    /// A write failed under a strategy that promises not to fail.
    #[error("task {task_id} write fault: {source}")]
    WriteFault { task_id: usize, source: WriteError },
}

impl RunFault {
    /// Short condition name for reports.
    #[must_use]
    pub fn condition(&self) -> &'static str {
        match self {
            RunFault::Timeout { .. } => "Timeout",
            RunFault::WriteFault { .. } => "WriteFault",
        }
    }
}

/// Invalid run parameters or environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown strategy: {0} (expected none, mutex, cow or map)")]
    UnknownStrategy(String),

    #[error("unknown key pattern: {0} (expected disjoint, overlapping or shuffled)")]
    UnknownKeyPattern(String),

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("{name}={value} is not a valid number")]
    InvalidEnv { name: &'static str, value: String },

    #[error("{tasks} tasks x {iterations} iterations overflows the key space")]
    TooManyWrites { tasks: usize, iterations: u64 },

    #[error("shuffled pattern needs {keys} precomputed keys, at most {max} supported")]
    ShuffleTooLarge { keys: u64, max: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_fault_display_names_task_and_cause() {
        let fault = RunFault::WriteFault {
            task_id: 3,
            source: WriteError::Poisoned,
        };
        let msg = fault.to_string();
        assert!(msg.contains("task 3"));
        assert!(msg.contains("poisoned"));
        assert_eq!(fault.condition(), "WriteFault");
    }

    #[test]
    fn test_timeout_condition() {
        let fault = RunFault::Timeout {
            timeout: Duration::from_millis(10),
            unfinished_tasks: 2,
        };
        assert_eq!(fault.condition(), "Timeout");
        assert!(fault.to_string().contains("2 task(s)"));
    }
}
