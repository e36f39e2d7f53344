//! Typed error hierarchy for the VCR orchestrator.
//!
//! One enum per component seam:
//! - `ProcessError` — child process failures, always carrying captured output
//! - `StoreError` — durable object store copies
//! - `InfrastructureError` — clone/build/auth/precondition failures (always fatal)
//! - `ReportError` — build status posting and verdict hand-off
//! - `OrchestratorError` — everything the phase controller can surface

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from running an external program.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}")]
    NonZeroExit {
        program: String,
        code: i32,
        output: String,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
        output: String,
    },

    #[error("Failed to capture output of {program}")]
    MissingOutputPipe { program: String },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Output captured before the failure, if the process got far enough to produce any.
    pub fn output(&self) -> &str {
        match self {
            ProcessError::NonZeroExit { output, .. } | ProcessError::TimedOut { output, .. } => {
                output
            }
            _ => "",
        }
    }

    /// Exit code to record in a phase report. Timeouts and spawn failures map to -1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessError::NonZeroExit { code, .. } => *code,
            _ => -1,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::TimedOut { .. })
    }
}

/// Errors from the durable object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to copy {src} to {dst}: {source}")]
    Copy {
        src: String,
        dst: String,
        #[source]
        source: ProcessError,
    },

    #[error("No objects match {pattern}")]
    NoMatch { pattern: String },

    #[error("Invalid object pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the surrounding infrastructure. These abort the run before
/// any phase verdict exists and are reported with no test-level detail.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("Failed to clone {remote} (branch {branch}): {source}")]
    Clone {
        remote: String,
        branch: String,
        #[source]
        source: ProcessError,
    },

    #[error("Build failed: {message}")]
    Build { message: String },

    #[error("Credential activation failed: {source}")]
    Auth {
        #[source]
        source: ProcessError,
    },

    #[error("Precondition failed running {program}: {source}")]
    Precondition {
        program: String,
        #[source]
        source: ProcessError,
    },

    #[error("Failed to prepare workspace at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Errors from posting status or handing off the verdict.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Status request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Status endpoint returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Failed to write verdict to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize verdict: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by the phase controller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_non_zero_exit_keeps_output() {
        let err = ProcessError::NonZeroExit {
            program: "go".into(),
            code: 1,
            output: "--- FAIL: TestAccFoo (0.1s)".into(),
        };
        assert_eq!(err.exit_code(), 1);
        assert!(err.output().contains("TestAccFoo"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn process_error_timeout_reports_seconds() {
        let err = ProcessError::TimedOut {
            program: "go".into(),
            timeout: Duration::from_secs(90),
            output: "partial".into(),
        };
        assert!(err.is_timeout());
        assert_eq!(err.exit_code(), -1);
        assert_eq!(err.output(), "partial");
        assert!(err.to_string().contains("90s"));
    }

    #[test]
    fn process_error_spawn_has_no_output() {
        let err = ProcessError::Spawn {
            program: "gsutil".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.output(), "");
        assert!(err.to_string().contains("gsutil"));
    }

    #[test]
    fn infrastructure_error_converts_into_orchestrator_error() {
        let inner = InfrastructureError::Build {
            message: "go build failed".into(),
        };
        let err: OrchestratorError = inner.into();
        match &err {
            OrchestratorError::Infrastructure(InfrastructureError::Build { message }) => {
                assert_eq!(message, "go build failed");
            }
            _ => panic!("Expected Infrastructure(Build)"),
        }
    }

    #[test]
    fn clone_error_names_remote_and_branch() {
        let err = InfrastructureError::Clone {
            remote: "https://github.com/o/r".into(),
            branch: "auto-pr-1".into(),
            source: ProcessError::NonZeroExit {
                program: "git".into(),
                code: 128,
                output: String::new(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("auto-pr-1"));
        assert!(msg.contains("https://github.com/o/r"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&InfrastructureError::Config("x".into()));
        assert_std_error(&StoreError::NoMatch {
            pattern: "a/*".into(),
        });
        assert_std_error(&ReportError::Status {
            code: 500,
            body: String::new(),
        });
    }
}
