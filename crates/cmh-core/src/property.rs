//! Property results and the checker trait.

use serde::Serialize;

/// Outcome of checking one named property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyResult {
    /// Property name (e.g. "NoDuplicates")
    pub name: &'static str,
    /// Whether the property holds
    pub holds: bool,
    /// What went wrong, if it does not hold
    pub violation: Option<String>,
    /// Observed values backing the violation
    pub evidence: Vec<(String, String)>,
}

impl PropertyResult {
    /// A property that holds.
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            violation: None,
            evidence: Vec::new(),
        }
    }

    /// A property that does not hold.
    #[must_use]
    pub fn fail(name: &'static str, violation: impl Into<String>) -> Self {
        Self {
            name,
            holds: false,
            violation: Some(violation.into()),
            evidence: Vec::new(),
        }
    }

    /// Attach an observed value.
    #[must_use]
    pub fn with_evidence(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.evidence.push((key.into(), value.to_string()));
        self
    }

    /// Single-line status.
    #[must_use]
    pub fn format_status(&self) -> String {
        match &self.violation {
            None => format!("[PASS] {}", self.name),
            Some(v) => format!("[FAIL] {}: {}", self.name, v),
        }
    }
}

/// Something that checks a fixed set of properties.
pub trait PropertyChecker {
    /// Check every property.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// Whether every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// First property that does not hold.
    fn first_violation(&self) -> Option<PropertyResult> {
        self.check_all().into_iter().find(|r| !r.holds)
    }
}
