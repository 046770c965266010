//! The shared container contract.

use std::collections::BTreeMap;

use crate::error::WriteError;
use crate::strategy::Strategy;

/// A mutable container written concurrently by writer tasks.
///
/// `append` and `put` may be called from any number of threads at once.
/// `size` and `snapshot` are only meaningful once every writer has finished.
/// Implementations provide the write of their own shape; the other one
/// reports `WriteError::Unsupported`.
pub trait SharedContainer: Send + Sync {
    /// Strategy this container implements.
    fn strategy(&self) -> Strategy;

    /// Append a value (sequence containers).
    fn append(&self, value: u64) -> Result<(), WriteError> {
        let _ = value;
        Err(WriteError::Unsupported {
            op: "append",
            strategy: self.strategy(),
        })
    }

    /// Insert or overwrite `key` (map containers).
    fn put(&self, key: u64, value: u64) -> Result<(), WriteError> {
        let _ = (key, value);
        Err(WriteError::Unsupported {
            op: "put",
            strategy: self.strategy(),
        })
    }

    /// Number of elements (sequence) or entries (map).
    fn size(&self) -> usize;

    /// Owned copy of the current contents.
    fn snapshot(&self) -> ContainerSnapshot;

    /// Compare-and-swap retries spent by writers so far.
    fn contention_retries(&self) -> u64 {
        0
    }
}

/// Contents of a container after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerSnapshot {
    Sequence(Vec<u64>),
    Map(BTreeMap<u64, u64>),
}

impl ContainerSnapshot {
    /// Number of elements or entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ContainerSnapshot::Sequence(values) => values.len(),
            ContainerSnapshot::Map(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
