//! What each writer task writes.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;
use crate::strategy::{ContainerKind, Strategy};

/// Key (or appended value) generator shared by all tasks of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum KeyPattern {
    /// Task `t` writes `t * n .. (t + 1) * n`; every write is unique.
    Disjoint,
    /// Every task writes `0 .. n`.
    Overlapping,
    /// Every task writes `0 .. n` in its own seeded random order.
    Shuffled { seed: u64 },
}

impl KeyPattern {
    /// Default pattern for a strategy: unique values for sequences,
    /// overlapping keys for the map.
    #[must_use]
    pub fn default_for(strategy: Strategy) -> Self {
        match strategy.kind() {
            ContainerKind::Sequence => KeyPattern::Disjoint,
            ContainerKind::Map => KeyPattern::Overlapping,
        }
    }

    /// Whether no two writes of a run share a key.
    #[must_use]
    pub fn unique_per_call(self) -> bool {
        matches!(self, KeyPattern::Disjoint)
    }

    /// First key task `task_id` writes under the sequential patterns.
    #[must_use]
    pub fn offset(self, task_id: usize, iterations: u64) -> u64 {
        match self {
            KeyPattern::Disjoint => task_id as u64 * iterations,
            KeyPattern::Overlapping | KeyPattern::Shuffled { .. } => 0,
        }
    }

    /// Exclusive upper bound of every key a run can write.
    #[must_use]
    pub fn key_space(self, tasks: usize, iterations: u64) -> u64 {
        match self {
            KeyPattern::Disjoint => tasks as u64 * iterations,
            KeyPattern::Overlapping | KeyPattern::Shuffled { .. } => iterations,
        }
    }

    /// Number of distinct keys a complete run writes.
    #[must_use]
    pub fn distinct_keys(self, tasks: usize, iterations: u64) -> usize {
        self.key_space(tasks, iterations) as usize
    }

    /// Size a complete run must reach for a strategy.
    ///
    /// Sequences keep every write; maps keep one entry per distinct key.
    #[must_use]
    pub fn expected_size(self, strategy: Strategy, tasks: usize, iterations: u64) -> usize {
        match strategy.kind() {
            ContainerKind::Sequence => tasks * iterations as usize,
            ContainerKind::Map => self.distinct_keys(tasks, iterations),
        }
    }
}

/// Value stored under `key` by map writers.
#[must_use]
pub fn value_for_key(key: u64) -> u64 {
    key
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Disjoint => f.write_str("disjoint"),
            KeyPattern::Overlapping => f.write_str("overlapping"),
            KeyPattern::Shuffled { seed } => write!(f, "shuffled:{}", seed),
        }
    }
}

impl FromStr for KeyPattern {
    type Err = ConfigError;

    /// Accepts `disjoint`, `overlapping`, `shuffled` or `shuffled:<seed>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let (name, seed) = match lower.split_once(':') {
            Some((name, seed)) => (name, Some(seed)),
            None => (lower.as_str(), None),
        };
        match (name, seed) {
            ("disjoint", None) => Ok(KeyPattern::Disjoint),
            ("overlapping", None) => Ok(KeyPattern::Overlapping),
            ("shuffled", None) => Ok(KeyPattern::Shuffled { seed: 0 }),
            ("shuffled", Some(seed)) => seed
                .parse()
                .map(|seed| KeyPattern::Shuffled { seed })
                .map_err(|_| ConfigError::UnknownKeyPattern(s.to_string())),
            _ => Err(ConfigError::UnknownKeyPattern(s.to_string())),
        }
    }
}
