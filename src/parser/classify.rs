//! Single-line classification.

use crate::model::{Outcome, TestCase};
use regex::Regex;
use std::sync::LazyLock;

static RESULT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--- (PASS|FAIL|SKIP): (\S+)").unwrap());

static BUILD_FAILURE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^FAIL\s+\S+\s+\[(build|setup) failed\]").unwrap());

const PANIC_PREFIX: &str = "panic: ";

/// What one line of test output means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Pass(TestCase),
    Fail(TestCase),
    Skip(TestCase),
    /// The provider process panicked; holds the panic line
    Crash(String),
    Unrecognized,
}

impl LineOutcome {
    /// The test and outcome for result lines.
    pub fn as_result(&self) -> Option<(&TestCase, Outcome)> {
        match self {
            LineOutcome::Pass(t) => Some((t, Outcome::Pass)),
            LineOutcome::Fail(t) => Some((t, Outcome::Fail)),
            LineOutcome::Skip(t) => Some((t, Outcome::Skip)),
            LineOutcome::Crash(_) | LineOutcome::Unrecognized => None,
        }
    }
}

/// Classify one line of `go test -v` output.
pub fn classify_line(line: &str) -> LineOutcome {
    let line = line.trim_end_matches('\r');
    if line.starts_with(PANIC_PREFIX) {
        return LineOutcome::Crash(line.to_string());
    }
    let Some(caps) = RESULT_REGEX.captures(line) else {
        return LineOutcome::Unrecognized;
    };
    let test = TestCase::new(&caps[2]);
    match &caps[1] {
        "PASS" => LineOutcome::Pass(test),
        "FAIL" => LineOutcome::Fail(test),
        "SKIP" => LineOutcome::Skip(test),
        _ => LineOutcome::Unrecognized,
    }
}

/// Whether output shows a package that failed to compile or set up, as
/// opposed to tests that ran and failed.
pub fn is_build_failure(output: &str) -> bool {
    BUILD_FAILURE_REGEX.is_match(output)
}
