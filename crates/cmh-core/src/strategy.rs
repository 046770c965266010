//! Concurrency-safety strategies.
//!
//! | Strategy | Shape | Write | Guarantee |
//! |----------|-------|-------|-----------|
//! | Unsynchronized | sequence | racy read-modify-write of the length | none, writes may be lost |
//! | MutexWrapped | sequence | exclusive lock per write | exact size |
//! | CopyOnWrite | sequence | CAS swap of a fresh full copy | exact size |
//! | LockFreeMap | map | CAS on the key's bucket | exact distinct-key count |

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;

/// Shape of the container a strategy manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Ordered sequence, written with `append`.
    Sequence,
    /// Key/value mapping, written with `put`.
    Map,
}

/// How a shared container protects concurrent writes.
///
/// Immutable for the lifetime of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// No synchronization at all. Exists to show the lost-update hazard.
    #[serde(rename = "none")]
    Unsynchronized,
    /// Every write holds one exclusive lock.
    MutexWrapped,
    /// Every write replaces the whole backing storage.
    CopyOnWrite,
    /// Per-bucket compare-and-swap map.
    LockFreeMap,
}

impl Strategy {
    /// All strategies, in presentation order.
    pub const ALL: [Strategy; 4] = [
        Strategy::Unsynchronized,
        Strategy::MutexWrapped,
        Strategy::CopyOnWrite,
        Strategy::LockFreeMap,
    ];

    /// Container shape this strategy manages.
    #[must_use]
    pub fn kind(self) -> ContainerKind {
        match self {
            Strategy::LockFreeMap => ContainerKind::Map,
            Strategy::Unsynchronized | Strategy::MutexWrapped | Strategy::CopyOnWrite => {
                ContainerKind::Sequence
            }
        }
    }

    /// Whether the final size must match the expected size exactly.
    #[must_use]
    pub fn guarantees_exact_size(self) -> bool {
        !matches!(self, Strategy::Unsynchronized)
    }

    /// Whether write errors are a tolerated outcome rather than a fault.
    #[must_use]
    pub fn tolerates_write_errors(self) -> bool {
        matches!(self, Strategy::Unsynchronized)
    }

    /// Short name used on the command line and in reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Unsynchronized => "none",
            Strategy::MutexWrapped => "mutex",
            Strategy::CopyOnWrite => "cow",
            Strategy::LockFreeMap => "map",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "unsynchronized" => Ok(Strategy::Unsynchronized),
            "mutex" | "mutex_wrapped" | "mutexwrapped" => Ok(Strategy::MutexWrapped),
            "cow" | "copy_on_write" | "copyonwrite" => Ok(Strategy::CopyOnWrite),
            "map" | "lock_free_map" | "lockfreemap" => Ok(Strategy::LockFreeMap),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
        }
        assert_eq!("CopyOnWrite".parse::<Strategy>().unwrap(), Strategy::CopyOnWrite);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "spinlock".parse::<Strategy>().unwrap_err();
        assert!(err.to_string().contains("spinlock"));
    }

    #[test]
    fn test_only_map_strategy_is_associative() {
        let maps: Vec<_> = Strategy::ALL
            .into_iter()
            .filter(|s| s.kind() == ContainerKind::Map)
            .collect();
        assert_eq!(maps, vec![Strategy::LockFreeMap]);
    }

    #[test]
    fn test_unsynchronized_is_the_only_lossy_strategy() {
        assert!(!Strategy::Unsynchronized.guarantees_exact_size());
        assert!(Strategy::Unsynchronized.tolerates_write_errors());
        for strategy in &Strategy::ALL[1..] {
            assert!(strategy.guarantees_exact_size());
            assert!(!strategy.tolerates_write_errors());
        }
    }
}
