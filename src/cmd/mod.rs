//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `vcr_test` | `VcrTest`        |
//! | `classify` | `Classify`       |

pub mod classify;
pub mod vcr_test;

pub use classify::cmd_classify;
pub use vcr_test::cmd_vcr_test;
