//! Structural invariants checked after a run.
//!
//! - `sequence`: ValuesInRange, NoDuplicates, SizeMatchesContents
//! - `map`: KeysInRange, EntriesConsistent, SizeMatchesContents
//!
//! Size acceptance per strategy lives in `verifier`, not here: these
//! properties hold for every strategy, including the unsynchronized one.

pub mod map;
pub mod sequence;

pub use map::MapPropertyChecker;
pub use sequence::SequencePropertyChecker;
