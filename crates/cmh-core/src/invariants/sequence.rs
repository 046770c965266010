//! Sequence container invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | ValuesInRange | Every element is a value some task could have appended |
//! | NoDuplicates | No value appears twice (only when values are unique per call) |
//! | SizeMatchesContents | `size()` agrees with the number of elements present |

use std::collections::HashSet;

use crate::property::{PropertyChecker, PropertyResult};

/// Property checker for sequence contents.
pub struct SequencePropertyChecker<'a> {
    values: &'a [u64],
    key_space: u64,
    unique_per_call: bool,
    reported_size: Option<usize>,
}

impl<'a> SequencePropertyChecker<'a> {
    /// Checker over `values`, all of which must lie in `0..key_space`.
    #[must_use]
    pub fn new(values: &'a [u64], key_space: u64) -> Self {
        Self {
            values,
            key_space,
            unique_per_call: false,
            reported_size: None,
        }
    }

    /// Require every value to appear at most once.
    #[must_use]
    pub fn expect_unique(mut self, unique: bool) -> Self {
        self.unique_per_call = unique;
        self
    }

    /// Size the container reported through `size()`.
    #[must_use]
    pub fn with_reported_size(mut self, size: usize) -> Self {
        self.reported_size = Some(size);
        self
    }

    fn check_values_in_range(&self) -> PropertyResult {
        match self.values.iter().position(|&v| v >= self.key_space) {
            Some(index) => PropertyResult::fail(
                "ValuesInRange",
                format!(
                    "element {} at index {} is outside 0..{}",
                    self.values[index], index, self.key_space
                ),
            )
            .with_evidence("index", index)
            .with_evidence("key_space", self.key_space),
            None => PropertyResult::pass("ValuesInRange"),
        }
    }

    fn check_no_duplicates(&self) -> PropertyResult {
        if !self.unique_per_call {
            return PropertyResult::pass("NoDuplicates");
        }

        let mut seen = HashSet::with_capacity(self.values.len());
        for (index, value) in self.values.iter().enumerate() {
            if !seen.insert(*value) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("value {} appears more than once", value),
                )
                .with_evidence("second_index", index);
            }
        }

        PropertyResult::pass("NoDuplicates")
    }

    fn check_size_matches_contents(&self) -> PropertyResult {
        match self.reported_size {
            Some(size) if size != self.values.len() => PropertyResult::fail(
                "SizeMatchesContents",
                format!("size() reported {} but {} elements present", size, self.values.len()),
            ),
            _ => PropertyResult::pass("SizeMatchesContents"),
        }
    }
}

impl PropertyChecker for SequencePropertyChecker<'_> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_values_in_range(),
            self.check_no_duplicates(),
            self.check_size_matches_contents(),
        ]
    }
}
