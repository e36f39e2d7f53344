//! Per-phase execution report.

use super::{CrashEvent, Outcome, Phase, TestCase, TestResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything one phase observed, in the order the phase ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    /// One result per test, last occurrence wins
    pub results: Vec<TestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash: Option<CrashEvent>,
    /// First non-zero exit code among the phase's invocations, else 0
    pub exit_code: i32,
    /// Whether any invocation of this phase hit its timeout
    #[serde(default)]
    pub timed_out: bool,
    /// Tests the phase was asked to run that produced no result line
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<TestCase>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Pass/skip/fail counts for analytics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub passed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Totals {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut totals = Self::default();
        for result in results {
            match result.outcome {
                Outcome::Pass => totals.passed += 1,
                Outcome::Skip => totals.skipped += 1,
                Outcome::Fail => totals.failed += 1,
            }
        }
        totals
    }

    pub fn total(&self) -> usize {
        self.passed + self.skipped + self.failed
    }
}

impl PhaseReport {
    pub fn new(phase: Phase, started_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            results: Vec::new(),
            crash: None,
            exit_code: 0,
            timed_out: false,
            unresolved: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    fn with_outcome(&self, outcome: Outcome) -> BTreeSet<TestCase> {
        self.results
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.test.clone())
            .collect()
    }

    pub fn passed(&self) -> BTreeSet<TestCase> {
        self.with_outcome(Outcome::Pass)
    }

    pub fn failed(&self) -> BTreeSet<TestCase> {
        self.with_outcome(Outcome::Fail)
    }

    pub fn is_crashed(&self) -> bool {
        self.crash.is_some()
    }

    /// The process reported an error that no individual test accounts for.
    pub fn has_uncaught_errors(&self) -> bool {
        (self.exit_code != 0 || self.timed_out)
            && self.crash.is_none()
            && self.unresolved.is_empty()
            && !self.results.iter().any(|r| r.outcome == Outcome::Fail)
    }

    pub fn totals(&self) -> Totals {
        Totals::from_results(&self.results)
    }
}
