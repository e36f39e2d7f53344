//! Test output parsing.
//!
//! Turns raw `go test -v` output into typed outcomes:
//!
//! - `--- PASS: TestName (1.00s)` → pass
//! - `--- FAIL: TestName (1.00s)` → fail
//! - `--- SKIP: TestName (0.00s)` → skip
//! - `panic: ...` → crash; parsing stops here
//!
//! Only top-level markers count. Sub-test markers are indented by the test
//! tool and classify as unrecognized.

mod classify;
mod output;

pub use classify::{LineOutcome, classify_line, is_build_failure};
pub use output::{ParsedOutput, RepetitionTally, parse, tally};
