//! Whole-output parsing for one phase.

use super::classify::{LineOutcome, classify_line};
use crate::model::{CrashEvent, Outcome, Phase, TestCase, TestResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Lines of goroutine trace kept after the panic line.
const PANIC_CONTEXT_LINES: usize = 40;

/// Parsed outcome of one phase's output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedOutput {
    /// One result per test in first-seen order; the last marker for a test
    /// decides its outcome
    pub results: Vec<TestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash: Option<CrashEvent>,
}

impl ParsedOutput {
    pub fn outcome_of(&self, test: &TestCase) -> Option<Outcome> {
        self.results
            .iter()
            .find(|r| &r.test == test)
            .map(|r| r.outcome)
    }
}

/// Parse raw output for `phase`. A panic line stops parsing and yields a
/// crash carrying the panic line and the trace that follows it.
pub fn parse(raw: &str, phase: Phase) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();
    let mut index: HashMap<TestCase, usize> = HashMap::new();
    let mut lines = raw.lines();

    while let Some(line) = lines.next() {
        match classify_line(line) {
            LineOutcome::Crash(panic_line) => {
                let mut text = panic_line;
                for trace in lines.by_ref().take(PANIC_CONTEXT_LINES) {
                    text.push('\n');
                    text.push_str(trace);
                }
                parsed.crash = Some(CrashEvent::new(phase, text));
                break;
            }
            LineOutcome::Unrecognized => {}
            other => {
                let Some((test, outcome)) = other.as_result() else {
                    continue;
                };
                match index.get(test) {
                    Some(&i) => parsed.results[i].outcome = outcome,
                    None => {
                        index.insert(test.clone(), parsed.results.len());
                        parsed
                            .results
                            .push(TestResult::new(test.clone(), outcome, phase));
                    }
                }
            }
        }
    }

    parsed
}

/// Outcome counts for a test executed several times in one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepetitionTally {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl RepetitionTally {
    /// Passed every one of `repetitions` runs.
    pub fn passed_all(&self, repetitions: u32) -> bool {
        self.failed == 0 && self.skipped == 0 && self.passed >= repetitions
    }
}

/// Count every top-level marker per test, without deduplication. Stops at a
/// panic line like `parse`.
pub fn tally(raw: &str) -> BTreeMap<TestCase, RepetitionTally> {
    let mut counts: BTreeMap<TestCase, RepetitionTally> = BTreeMap::new();
    for line in raw.lines() {
        match classify_line(line) {
            LineOutcome::Crash(_) => break,
            LineOutcome::Pass(t) => counts.entry(t).or_default().passed += 1,
            LineOutcome::Fail(t) => counts.entry(t).or_default().failed += 1,
            LineOutcome::Skip(t) => counts.entry(t).or_default().skipped += 1,
            LineOutcome::Unrecognized => {}
        }
    }
    counts
}
