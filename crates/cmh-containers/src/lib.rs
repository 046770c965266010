//! # cmh-containers
//!
//! One shared container per concurrency strategy.
//!
//! | Strategy | Container | Mechanism |
//! |----------|-----------|-----------|
//! | Unsynchronized | `RacyVec` | racy length read-modify-write (loses updates) |
//! | MutexWrapped | `MutexVec` | `std::sync::Mutex` around a `Vec` |
//! | CopyOnWrite | `CowVec` | CAS swap of full copies, crossbeam-epoch reclamation |
//! | LockFreeMap | `LockFreeMap` | per-bucket CAS linked lists |

pub mod cow_vec;
pub mod lockfree_map;
pub mod mutex_vec;
pub mod racy_vec;

pub use cow_vec::CowVec;
pub use lockfree_map::LockFreeMap;
pub use mutex_vec::MutexVec;
pub use racy_vec::RacyVec;

use cmh_core::{SharedContainer, Strategy};

/// Build an empty container for `strategy`, sized for `capacity` elements.
#[must_use]
pub fn build(strategy: Strategy, capacity: usize) -> Box<dyn SharedContainer> {
    match strategy {
        Strategy::Unsynchronized => Box::new(RacyVec::with_capacity(capacity)),
        Strategy::MutexWrapped => Box::new(MutexVec::with_capacity(capacity)),
        Strategy::CopyOnWrite => Box::new(CowVec::new()),
        Strategy::LockFreeMap => Box::new(LockFreeMap::with_capacity(capacity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_matches_strategy() {
        for strategy in Strategy::ALL {
            let container = build(strategy, 16);
            assert_eq!(container.strategy(), strategy);
            assert_eq!(container.size(), 0);
            assert!(container.snapshot().is_empty());
        }
    }
}
