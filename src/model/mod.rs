//! Core data model for an orchestration run.
//!
//! - `TestCase`, `Outcome`, `Phase` — identities and classifications
//! - `TestResult`, `CrashEvent` — what a single phase observed
//! - `PhaseReport` — one per executed phase, in execution order
//! - `Verdict` — the fold over all phase reports

mod report;
mod verdict;

pub use report::{PhaseReport, Totals};
pub use verdict::{Verdict, VerdictKind};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A test identified by the name the test tool reports for it.
///
/// Ordering is lexicographic so sets of tests render deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCase(String);

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Anchored `-run` pattern selecting exactly this test.
    pub fn run_pattern(&self) -> String {
        format!("{}$", self.0)
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestCase {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Per-test outcome as reported by the test tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

/// Execution phase of the orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Replaying,
    Recording,
    VerifyReplay,
}

impl Phase {
    /// Value exported as `VCR_MODE` to the test process.
    pub fn vcr_mode(&self) -> &'static str {
        match self {
            Phase::Replaying | Phase::VerifyReplay => "REPLAYING",
            Phase::Recording => "RECORDING",
        }
    }

    /// Directory (under `testlog/` locally and the build prefix remotely)
    /// holding the provider debug logs for this phase.
    pub fn debug_log_dir(&self) -> &'static str {
        match self {
            Phase::Replaying => "replaying",
            Phase::Recording => "recording",
            Phase::VerifyReplay => "replaying_after_recording",
        }
    }

    /// Directory holding per-test build logs. Replaying runs as one
    /// invocation and has no per-test build logs.
    pub fn build_log_dir(&self) -> Option<&'static str> {
        match self {
            Phase::Replaying => None,
            Phase::Recording => Some("recording_build"),
            Phase::VerifyReplay => Some("replaying_build_after_recording"),
        }
    }

    /// File name of the aggregate build log for this phase.
    pub fn aggregate_log_name(&self) -> &'static str {
        match self {
            Phase::Replaying => "replaying_test.log",
            Phase::Recording => "recording_test.log",
            Phase::VerifyReplay => "replaying_build_after_recording.log",
        }
    }

    /// File name of a single test's build log within `build_log_dir`.
    pub fn per_test_log_name(&self, test: &TestCase) -> String {
        match self {
            Phase::Replaying => format!("{}_replaying_test.log", test),
            Phase::Recording => format!("{}_recording_test.log", test),
            Phase::VerifyReplay => format!("{}_replaying_test.log", test),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Replaying => write!(f, "replaying"),
            Phase::Recording => write!(f, "recording"),
            Phase::VerifyReplay => write!(f, "verify-replay"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replaying" => Ok(Phase::Replaying),
            "recording" => Ok(Phase::Recording),
            "verify-replay" | "verify_replay" => Ok(Phase::VerifyReplay),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: replaying, recording, verify-replay",
                s
            ),
        }
    }
}

/// Where the logs for one test of one phase live, relative to the build's
/// artifact prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLocation {
    /// Build log holding the test tool's output for this test
    pub build_log: String,
    /// Provider debug log written through `TF_LOG_PATH_MASK`
    pub debug_log: String,
}

impl LogLocation {
    pub fn for_test(phase: Phase, test: &TestCase) -> Self {
        let build_log = match phase.build_log_dir() {
            Some(dir) => format!("build-log/{}/{}", dir, phase.per_test_log_name(test)),
            None => format!("build-log/{}", phase.aggregate_log_name()),
        };
        Self {
            build_log,
            debug_log: format!("{}/{}.log", phase.debug_log_dir(), test),
        }
    }
}

/// Outcome of one test in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test: TestCase,
    pub outcome: Outcome,
    pub phase: Phase,
    pub log_location: LogLocation,
}

impl TestResult {
    pub fn new(test: TestCase, outcome: Outcome, phase: Phase) -> Self {
        let log_location = LogLocation::for_test(phase, &test);
        Self {
            test,
            outcome,
            phase,
            log_location,
        }
    }
}

/// A provider crash observed during a phase. Its presence makes the whole
/// phase indeterminate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub phase: Phase,
    pub raw_panic_text: String,
    /// Aggregate build log to point the author at
    pub log_location: String,
}

impl CrashEvent {
    pub fn new(phase: Phase, raw_panic_text: impl Into<String>) -> Self {
        Self {
            phase,
            raw_panic_text: raw_panic_text.into(),
            log_location: format!("build-log/{}", phase.aggregate_log_name()),
        }
    }
}
