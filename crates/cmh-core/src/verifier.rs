//! Post-run verification.
//!
//! A run passes when it did not fault, its final size is acceptable for the
//! strategy, and the container contents hold the structural invariants.
//!
//! | Strategy | Acceptable size |
//! |----------|-----------------|
//! | Unsynchronized | `0..=expected` (accepted writes missing from the contents reported as race loss) |
//! | MutexWrapped, CopyOnWrite | exactly `expected` writes |
//! | LockFreeMap | exactly `expected` distinct keys |

use serde::Serialize;

use crate::container::ContainerSnapshot;
use crate::invariants::{MapPropertyChecker, SequencePropertyChecker};
use crate::property::{PropertyChecker, PropertyResult};
use crate::result::RunResult;
use crate::strategy::Strategy;

/// Writes that vanished under the unsynchronized strategy.
///
/// Only writes the container accepted count: a write rejected with a
/// tolerated error was never stored, so it is not lost to a race.
/// Informational only: losing writes is what that strategy demonstrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RaceLoss {
    /// Size a complete run reaches
    pub expected: usize,
    /// Writes that returned success
    pub accepted: usize,
    /// Final container size
    pub observed: usize,
    /// `accepted - observed`
    pub lost_writes: usize,
}

/// Full verification report for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub strategy: Strategy,
    pub expected_size: usize,
    pub observed_size: usize,
    pub passed: bool,
    pub race_loss: Option<RaceLoss>,
    pub properties: Vec<PropertyResult>,
}

impl Verification {
    /// Multi-line report: one status line per property.
    #[must_use]
    pub fn format_report(&self) -> String {
        let mut report = format!(
            "{} {}: size {}/{}\n",
            if self.passed { "[PASS]" } else { "[FAIL]" },
            self.strategy,
            self.observed_size,
            self.expected_size,
        );
        for property in &self.properties {
            report.push_str("  ");
            report.push_str(&property.format_status());
            report.push('\n');
        }
        if let Some(loss) = self.race_loss {
            report.push_str(&format!(
                "  [INFO] RaceLoss: {} of {} accepted writes lost\n",
                loss.lost_writes, loss.accepted
            ));
        }
        report
    }
}

/// Checks a run result against the expectations of a strategy.
///
/// Borrows the result immutably, so checking twice gives the same answer.
pub struct Verifier<'a> {
    result: &'a RunResult,
    strategy: Strategy,
    expected_size: usize,
}

impl<'a> Verifier<'a> {
    #[must_use]
    pub fn new(result: &'a RunResult, strategy: Strategy, expected_size: usize) -> Self {
        Self {
            result,
            strategy,
            expected_size,
        }
    }

    /// Verifier using the strategy and expected size recorded in the result.
    #[must_use]
    pub fn for_result(result: &'a RunResult) -> Self {
        Self::new(result, result.strategy, result.expected_size)
    }

    /// Whether `size` is acceptable for the strategy.
    #[must_use]
    pub fn size_acceptable(strategy: Strategy, size: usize, expected_size: usize) -> bool {
        if strategy.guarantees_exact_size() {
            size == expected_size
        } else {
            size <= expected_size
        }
    }

    fn check_no_fault(&self) -> PropertyResult {
        match &self.result.fault {
            Some(fault) => PropertyResult::fail("NoFault", fault.to_string())
                .with_evidence("condition", fault.condition()),
            None if self.result.faulted => {
                PropertyResult::fail("NoFault", "run marked faulted without a cause")
            }
            None => PropertyResult::pass("NoFault"),
        }
    }

    fn check_acceptable_size(&self) -> PropertyResult {
        let size = self.result.final_size;
        if Self::size_acceptable(self.strategy, size, self.expected_size) {
            return PropertyResult::pass("AcceptableSize");
        }

        let rule = if self.strategy.guarantees_exact_size() {
            "exactly"
        } else {
            "at most"
        };
        PropertyResult::fail(
            "AcceptableSize",
            format!(
                "{} produced {} but must hold {} {}",
                self.strategy, size, rule, self.expected_size
            ),
        )
        .with_evidence("lost", self.expected_size.saturating_sub(size))
    }

    fn check_structure(&self) -> Vec<PropertyResult> {
        let key_space = self
            .result
            .key_pattern
            .key_space(self.result.tasks, self.result.iterations_per_task);

        match &self.result.contents {
            ContainerSnapshot::Sequence(values) => SequencePropertyChecker::new(values, key_space)
                .expect_unique(self.result.key_pattern.unique_per_call())
                .with_reported_size(self.result.final_size)
                .check_all(),
            ContainerSnapshot::Map(entries) => MapPropertyChecker::new(entries, key_space)
                .with_reported_size(self.result.final_size)
                .check_all(),
        }
    }

    /// Accepted writes missing from the contents under the unsynchronized
    /// strategy, if any.
    #[must_use]
    pub fn race_loss(&self) -> Option<RaceLoss> {
        if self.strategy.guarantees_exact_size() || self.result.timed_out() {
            return None;
        }
        let observed = self.result.final_size;
        let accepted = usize::try_from(self.result.writes_completed()).unwrap_or(usize::MAX);
        if observed >= accepted {
            return None;
        }
        Some(RaceLoss {
            expected: self.expected_size,
            accepted,
            observed,
            lost_writes: accepted - observed,
        })
    }

    /// Run every check and build the report.
    #[must_use]
    pub fn verify(&self) -> Verification {
        let properties = self.check_all();
        let passed = properties.iter().all(|p| p.holds);
        let race_loss = self.race_loss();

        if let Some(loss) = race_loss {
            log::info!(
                "{}: race lost {} of {} accepted writes (expected outcome)",
                self.strategy,
                loss.lost_writes,
                loss.accepted
            );
        }

        Verification {
            strategy: self.strategy,
            expected_size: self.expected_size,
            observed_size: self.result.final_size,
            passed,
            race_loss,
            properties,
        }
    }
}

impl PropertyChecker for Verifier<'_> {
    fn check_all(&self) -> Vec<PropertyResult> {
        let mut results = vec![self.check_no_fault(), self.check_acceptable_size()];
        results.extend(self.check_structure());
        results
    }
}

/// Whether `result` is acceptable for `strategy` given `expected_size`.
#[must_use]
pub fn verify(result: &RunResult, strategy: Strategy, expected_size: usize) -> bool {
    Verifier::new(result, strategy, expected_size).all_hold()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::strategy::Strategy;
    use crate::error::{RunFault, WriteError};
    use crate::pattern::KeyPattern;
    use crate::result::TaskOutcome;

    fn finished_task(task_id: usize, writes: u64) -> TaskOutcome {
        TaskOutcome {
            task_id,
            writes_completed: writes,
            finished: true,
            error: None,
            elapsed: Duration::from_millis(2),
        }
    }

    fn sequence_result(strategy: Strategy, values: Vec<u64>) -> RunResult {
        RunResult {
            strategy,
            key_pattern: KeyPattern::Disjoint,
            tasks: 2,
            iterations_per_task: 1000,
            final_size: values.len(),
            expected_size: 2000,
            elapsed: Duration::from_millis(3),
            faulted: false,
            fault: None,
            contention_retries: 0,
            task_outcomes: vec![finished_task(0, 1000), finished_task(1, 1000)],
            contents: ContainerSnapshot::Sequence(values),
        }
    }

    #[test]
    fn test_exact_size_required_for_locked_strategies() {
        let full = sequence_result(Strategy::MutexWrapped, (0..2000).collect());
        assert!(verify(&full, Strategy::MutexWrapped, 2000));

        let short = sequence_result(Strategy::CopyOnWrite, (0..1999).collect());
        assert!(!verify(&short, Strategy::CopyOnWrite, 2000));
    }

    #[test]
    fn test_unsynchronized_accepts_shortfall_and_reports_race_loss() {
        let short = sequence_result(Strategy::Unsynchronized, (0..1500).collect());
        let verification = Verifier::for_result(&short).verify();
        assert!(verification.passed);
        let loss = verification.race_loss.unwrap();
        assert_eq!(loss.accepted, 2000);
        assert_eq!(loss.lost_writes, 500);
        assert!(verification.format_report().contains("RaceLoss"));
    }

    #[test]
    fn test_rejected_writes_are_not_race_loss() {
        // One writer, storage full after 100 writes: nothing raced.
        let mut result = sequence_result(Strategy::Unsynchronized, (0..100).collect());
        result.tasks = 1;
        result.expected_size = 1000;
        result.task_outcomes = vec![TaskOutcome {
            task_id: 0,
            writes_completed: 100,
            finished: false,
            error: Some(WriteError::CapacityExceeded { capacity: 100 }),
            elapsed: Duration::from_millis(1),
        }];

        let verification = Verifier::for_result(&result).verify();
        assert!(verification.passed);
        assert_eq!(verification.race_loss, None);
    }

    #[test]
    fn test_unsynchronized_rejects_oversize() {
        let over = sequence_result(Strategy::Unsynchronized, (0..2000).collect());
        assert!(!verify(&over, Strategy::Unsynchronized, 1999));
    }

    #[test]
    fn test_map_compares_against_distinct_keys() {
        let entries: BTreeMap<u64, u64> = (0..1000).map(|k| (k, k)).collect();
        let result = RunResult {
            key_pattern: KeyPattern::Overlapping,
            final_size: 1000,
            expected_size: 1000,
            contents: ContainerSnapshot::Map(entries),
            ..sequence_result(Strategy::LockFreeMap, Vec::new())
        };
        assert!(verify(&result, Strategy::LockFreeMap, 1000));
        assert!(!verify(&result, Strategy::LockFreeMap, 2000));
    }

    #[test]
    fn test_faulted_run_never_passes() {
        let mut result = sequence_result(Strategy::MutexWrapped, (0..2000).collect());
        result.faulted = true;
        result.fault = Some(RunFault::WriteFault {
            task_id: 1,
            source: WriteError::Poisoned,
        });
        let verification = Verifier::for_result(&result).verify();
        assert!(!verification.passed);
        assert_eq!(verification.properties[0].name, "NoFault");
        assert!(!verification.properties[0].holds);
    }

    #[test]
    fn test_timeout_is_not_reported_as_race_loss() {
        let mut result = sequence_result(Strategy::Unsynchronized, (0..10).collect());
        result.faulted = true;
        result.fault = Some(RunFault::Timeout {
            timeout: Duration::from_millis(1),
            unfinished_tasks: 2,
        });
        let verifier = Verifier::for_result(&result);
        assert!(verifier.race_loss().is_none());
        assert!(!verifier.all_hold());
    }

    #[test]
    fn test_duplicate_values_fail_when_unique_expected() {
        let mut values: Vec<u64> = (0..2000).collect();
        values[10] = 11;
        let result = sequence_result(Strategy::CopyOnWrite, values);
        let violation = Verifier::for_result(&result).first_violation().unwrap();
        assert_eq!(violation.name, "NoDuplicates");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_verify_is_idempotent(size in 0usize..3000, strategy_idx in 0usize..3) {
            let strategy = Strategy::ALL[strategy_idx];
            let result = sequence_result(strategy, (0..size as u64).collect());
            let first = verify(&result, strategy, 2000);
            let second = verify(&result, strategy, 2000);
            prop_assert_eq!(first, second);
            prop_assert_eq!(result.final_size, size);
        }

        #[test]
        fn prop_size_rule(size in 0usize..5000, expected in 0usize..5000) {
            prop_assert_eq!(
                Verifier::size_acceptable(Strategy::Unsynchronized, size, expected),
                size <= expected
            );
            for strategy in &Strategy::ALL[1..] {
                prop_assert_eq!(
                    Verifier::size_acceptable(*strategy, size, expected),
                    size == expected
                );
            }
        }
    }
}
