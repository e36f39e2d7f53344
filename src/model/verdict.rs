//! Final verdict for a run, folded from its phase reports.

use super::{CrashEvent, Phase, PhaseReport, TestCase, Totals};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Top-level classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Pass,
    Fail,
    /// A phase crashed; the run is indeterminate
    Crash,
    /// No relevant files changed; nothing ran
    Skipped,
}

impl VerdictKind {
    /// Status state posted for this verdict, `None` when nothing is posted.
    pub fn status_state(&self) -> Option<&'static str> {
        match self {
            VerdictKind::Pass => Some("success"),
            VerdictKind::Fail | VerdictKind::Crash => Some("failure"),
            VerdictKind::Skipped => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            VerdictKind::Pass | VerdictKind::Skipped => 0,
            VerdictKind::Fail | VerdictKind::Crash => 1,
        }
    }
}

/// Structured verdict handed to the status and comment collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash: Option<CrashEvent>,
    /// Counts from the replaying phase
    pub replay_totals: Totals,
    pub failed_replay: BTreeSet<TestCase>,
    pub passed_recording: BTreeSet<TestCase>,
    pub failed_recording: BTreeSet<TestCase>,
    /// Entered recording but never reported a result
    pub terminated: BTreeSet<TestCase>,
    /// Passed recording but failed at least one verify repetition
    pub failed_verify: BTreeSet<TestCase>,
    /// Passed recording and every verify repetition
    pub recovered: BTreeSet<TestCase>,
    /// Phases that timed out, or whose process failed without any failing
    /// test to show for it
    pub errored_phases: Vec<Phase>,
}

impl Verdict {
    pub fn skipped() -> Self {
        Self::empty(VerdictKind::Skipped)
    }

    fn empty(kind: VerdictKind) -> Self {
        Self {
            kind,
            crash: None,
            replay_totals: Totals::default(),
            failed_replay: BTreeSet::new(),
            passed_recording: BTreeSet::new(),
            failed_recording: BTreeSet::new(),
            terminated: BTreeSet::new(),
            failed_verify: BTreeSet::new(),
            recovered: BTreeSet::new(),
            errored_phases: Vec::new(),
        }
    }

    /// Fold phase reports (in execution order) into a verdict.
    ///
    /// A test's standing is decided by the last phase it ran in. A crash
    /// anywhere wins over every count.
    pub fn fold(reports: &[PhaseReport]) -> Self {
        let mut verdict = Self::empty(VerdictKind::Pass);
        let mut saw_recording = false;
        let mut saw_verify = false;

        for report in reports {
            if let Some(crash) = &report.crash {
                verdict.kind = VerdictKind::Crash;
                verdict.crash = Some(crash.clone());
                return verdict;
            }
            // A timed-out phase never ran part of its input, whatever it
            // managed to report.
            if report.timed_out || report.has_uncaught_errors() {
                verdict.errored_phases.push(report.phase);
            }
            match report.phase {
                Phase::Replaying => {
                    verdict.replay_totals = report.totals();
                    verdict.failed_replay = report.failed();
                }
                Phase::Recording => {
                    saw_recording = true;
                    let passed = report.passed();
                    verdict.passed_recording = verdict
                        .failed_replay
                        .intersection(&passed)
                        .cloned()
                        .collect();
                    verdict.failed_recording = verdict
                        .failed_replay
                        .difference(&verdict.passed_recording)
                        .cloned()
                        .collect();
                    verdict.terminated = report
                        .unresolved
                        .iter()
                        .filter(|t| verdict.failed_replay.contains(*t))
                        .cloned()
                        .collect();
                }
                Phase::VerifyReplay => {
                    saw_verify = true;
                    let passed = report.passed();
                    verdict.recovered = verdict
                        .passed_recording
                        .intersection(&passed)
                        .cloned()
                        .collect();
                    verdict.failed_verify = verdict
                        .passed_recording
                        .difference(&verdict.recovered)
                        .cloned()
                        .collect();
                }
            }
        }

        // Missing later phases leave their inputs unresolved.
        if !saw_recording {
            verdict.failed_recording = verdict.failed_replay.clone();
        }
        if !saw_verify {
            verdict.failed_verify = verdict.passed_recording.clone();
        }

        let clean = verdict.failed_replay.is_empty()
            || (verdict.failed_recording.is_empty() && verdict.failed_verify.is_empty());
        verdict.kind = if clean && verdict.errored_phases.is_empty() {
            VerdictKind::Pass
        } else {
            VerdictKind::Fail
        };
        verdict
    }

    /// Tests still failing at the end of the run, for messaging.
    pub fn failing_tests(&self) -> BTreeSet<TestCase> {
        self.failed_recording
            .union(&self.failed_verify)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, TestResult};
    use chrono::Utc;

    fn report(phase: Phase, results: &[(&str, Outcome)]) -> PhaseReport {
        let mut report = PhaseReport::new(phase, Utc::now());
        report.results = results
            .iter()
            .map(|(name, outcome)| TestResult::new(TestCase::new(*name), *outcome, phase))
            .collect();
        report
    }

    fn set(names: &[&str]) -> BTreeSet<TestCase> {
        names.iter().map(|n| TestCase::new(*n)).collect()
    }

    #[test]
    fn test_clean_replay_passes() {
        let v = Verdict::fold(&[report(
            Phase::Replaying,
            &[("TestAccA", Outcome::Pass), ("TestAccB", Outcome::Skip)],
        )]);
        assert_eq!(v.kind, VerdictKind::Pass);
        assert!(v.failed_replay.is_empty());
        assert!(v.failed_recording.is_empty());
        assert_eq!(v.replay_totals.total(), 2);
    }

    #[test]
    fn test_recovered_after_recording_and_verify_passes() {
        let v = Verdict::fold(&[
            report(Phase::Replaying, &[("TestAccFoo", Outcome::Fail)]),
            report(Phase::Recording, &[("TestAccFoo", Outcome::Pass)]),
            report(Phase::VerifyReplay, &[("TestAccFoo", Outcome::Pass)]),
        ]);
        assert_eq!(v.kind, VerdictKind::Pass);
        assert_eq!(v.recovered, set(&["TestAccFoo"]));
    }

    #[test]
    fn test_still_failing_in_recording_fails() {
        let v = Verdict::fold(&[
            report(Phase::Replaying, &[("TestAccBar", Outcome::Fail)]),
            report(Phase::Recording, &[("TestAccBar", Outcome::Fail)]),
        ]);
        assert_eq!(v.kind, VerdictKind::Fail);
        assert_eq!(v.failed_recording, set(&["TestAccBar"]));
        assert!(v.failed_verify.is_empty());
        assert_eq!(v.failing_tests(), set(&["TestAccBar"]));
    }

    #[test]
    fn test_recording_buckets_partition_failed_replay() {
        let mut recording = report(
            Phase::Recording,
            &[("TestAccA", Outcome::Pass), ("TestAccB", Outcome::Skip)],
        );
        recording.unresolved = vec![TestCase::new("TestAccC")];
        let v = Verdict::fold(&[
            report(
                Phase::Replaying,
                &[
                    ("TestAccA", Outcome::Fail),
                    ("TestAccB", Outcome::Fail),
                    ("TestAccC", Outcome::Fail),
                ],
            ),
            recording,
            report(Phase::VerifyReplay, &[("TestAccA", Outcome::Pass)]),
        ]);
        let union: BTreeSet<_> = v
            .passed_recording
            .union(&v.failed_recording)
            .cloned()
            .collect();
        assert_eq!(union, v.failed_replay);
        assert!(v.passed_recording.is_disjoint(&v.failed_recording));
        assert_eq!(v.terminated, set(&["TestAccC"]));
        assert_eq!(v.kind, VerdictKind::Fail);
    }

    #[test]
    fn test_verify_failure_is_reported_separately() {
        let v = Verdict::fold(&[
            report(
                Phase::Replaying,
                &[("TestAccA", Outcome::Fail), ("TestAccB", Outcome::Fail)],
            ),
            report(
                Phase::Recording,
                &[("TestAccA", Outcome::Pass), ("TestAccB", Outcome::Pass)],
            ),
            report(
                Phase::VerifyReplay,
                &[("TestAccA", Outcome::Pass), ("TestAccB", Outcome::Fail)],
            ),
        ]);
        assert_eq!(v.kind, VerdictKind::Fail);
        assert_eq!(v.failed_verify, set(&["TestAccB"]));
        assert!(v.failed_recording.is_empty());
        assert_eq!(v.recovered, set(&["TestAccA"]));
    }

    #[test]
    fn test_crash_overrides_counts() {
        let mut replay = report(Phase::Replaying, &[("TestAccA", Outcome::Pass)]);
        replay.crash = Some(CrashEvent::new(Phase::Replaying, "panic: oops"));
        let v = Verdict::fold(&[replay]);
        assert_eq!(v.kind, VerdictKind::Crash);
        assert_eq!(v.kind.status_state(), Some("failure"));
        assert_eq!(v.kind.exit_code(), 1);
    }

    #[test]
    fn test_crash_in_recording_wins_over_replay_results() {
        let mut recording = report(Phase::Recording, &[("TestAccA", Outcome::Pass)]);
        recording.crash = Some(CrashEvent::new(Phase::Recording, "panic: nil map"));
        let v = Verdict::fold(&[
            report(Phase::Replaying, &[("TestAccA", Outcome::Fail)]),
            recording,
        ]);
        assert_eq!(v.kind, VerdictKind::Crash);
        assert_eq!(v.crash.unwrap().phase, Phase::Recording);
    }

    #[test]
    fn test_replay_errors_without_failures_fail_the_run() {
        let mut replay = report(Phase::Replaying, &[("TestAccA", Outcome::Pass)]);
        replay.exit_code = 2;
        let v = Verdict::fold(&[replay]);
        assert_eq!(v.kind, VerdictKind::Fail);
        assert_eq!(v.errored_phases, vec![Phase::Replaying]);
    }

    #[test]
    fn test_timed_out_replay_fails_even_when_failures_recover() {
        let mut replay = report(Phase::Replaying, &[("TestAccFoo", Outcome::Fail)]);
        replay.exit_code = 1;
        replay.timed_out = true;
        let v = Verdict::fold(&[
            replay,
            report(Phase::Recording, &[("TestAccFoo", Outcome::Pass)]),
            report(Phase::VerifyReplay, &[("TestAccFoo", Outcome::Pass)]),
        ]);
        assert_eq!(v.recovered, set(&["TestAccFoo"]));
        assert_eq!(v.errored_phases, vec![Phase::Replaying]);
        assert_eq!(v.kind, VerdictKind::Fail);
    }

    #[test]
    fn test_missing_recording_report_keeps_tests_failed() {
        let v = Verdict::fold(&[report(Phase::Replaying, &[("TestAccA", Outcome::Fail)])]);
        assert_eq!(v.kind, VerdictKind::Fail);
        assert_eq!(v.failed_recording, set(&["TestAccA"]));
    }

    #[test]
    fn test_skipped_verdict_exits_zero_without_status() {
        let v = Verdict::skipped();
        assert_eq!(v.kind.exit_code(), 0);
        assert_eq!(v.kind.status_state(), None);
    }
}
