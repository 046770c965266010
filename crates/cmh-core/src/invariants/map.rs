//! Map container invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | KeysInRange | Every key is one some task could have written |
//! | EntriesConsistent | Every value is the value writers derive from its key (no torn entries) |
//! | SizeMatchesContents | `size()` agrees with the number of entries present |

use std::collections::BTreeMap;

use crate::pattern::value_for_key;
use crate::property::{PropertyChecker, PropertyResult};

/// Property checker for map contents.
pub struct MapPropertyChecker<'a> {
    entries: &'a BTreeMap<u64, u64>,
    key_space: u64,
    reported_size: Option<usize>,
}

impl<'a> MapPropertyChecker<'a> {
    /// Checker over `entries`, whose keys must lie in `0..key_space`.
    #[must_use]
    pub fn new(entries: &'a BTreeMap<u64, u64>, key_space: u64) -> Self {
        Self {
            entries,
            key_space,
            reported_size: None,
        }
    }

    /// Size the container reported through `size()`.
    #[must_use]
    pub fn with_reported_size(mut self, size: usize) -> Self {
        self.reported_size = Some(size);
        self
    }

    fn check_keys_in_range(&self) -> PropertyResult {
        // Keys are ordered, so only the largest needs checking.
        match self.entries.keys().next_back() {
            Some(&key) if key >= self.key_space => PropertyResult::fail(
                "KeysInRange",
                format!("key {} is outside 0..{}", key, self.key_space),
            ),
            _ => PropertyResult::pass("KeysInRange"),
        }
    }

    fn check_entries_consistent(&self) -> PropertyResult {
        for (&key, &value) in self.entries {
            let expected = value_for_key(key);
            if value != expected {
                return PropertyResult::fail(
                    "EntriesConsistent",
                    format!("key {} holds {} but writers only store {}", key, value, expected),
                )
                .with_evidence("key", key)
                .with_evidence("value", value);
            }
        }
        PropertyResult::pass("EntriesConsistent")
    }

    fn check_size_matches_contents(&self) -> PropertyResult {
        match self.reported_size {
            Some(size) if size != self.entries.len() => PropertyResult::fail(
                "SizeMatchesContents",
                format!("size() reported {} but {} entries present", size, self.entries.len()),
            ),
            _ => PropertyResult::pass("SizeMatchesContents"),
        }
    }
}

impl PropertyChecker for MapPropertyChecker<'_> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_keys_in_range(),
            self.check_entries_consistent(),
            self.check_size_matches_contents(),
        ]
    }
}
