//! External process execution.
//!
//! `ProcessRunner` is the only way the orchestrator touches child
//! processes. The real implementation is `CommandRunner`; tests use the
//! scripted runner in `testing`.

use crate::errors::{InfrastructureError, ProcessError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long reader tasks may keep draining pipes after a timed-out child is
/// killed. Grandchildren can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// A program invocation: name, arguments, extra environment and an
/// optional hard timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, env: &[(String, String)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of an environment entry set on this invocation.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Runs external programs relative to a working directory set by `chdir`.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Change the working directory used by later invocations.
    fn chdir(&self, path: &Path);

    /// Current working directory.
    fn cwd(&self) -> PathBuf;

    /// Run to completion and return combined stdout+stderr. A non-zero exit
    /// or timeout is an error that still carries the captured output.
    async fn run(&self, invocation: &Invocation) -> Result<String, ProcessError>;

    /// Like `run`, but failure is fatal to the orchestration.
    async fn must_run(&self, invocation: &Invocation) -> Result<String, InfrastructureError> {
        self.run(invocation)
            .await
            .map_err(|source| InfrastructureError::Precondition {
                program: invocation.program.clone(),
                source,
            })
    }

    /// Write a file relative to the working directory.
    async fn write_file(&self, path: &str, data: &str) -> std::io::Result<()> {
        tokio::fs::write(self.cwd().join(path), data).await
    }
}

/// `ProcessRunner` backed by `tokio::process`.
pub struct CommandRunner {
    cwd: RwLock<PathBuf>,
}

impl CommandRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: RwLock::new(cwd.into()),
        }
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    fn chdir(&self, path: &Path) {
        let mut cwd = self.cwd.write().unwrap_or_else(|e| e.into_inner());
        *cwd = if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        };
    }

    fn cwd(&self) -> PathBuf {
        self.cwd.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn run(&self, invocation: &Invocation) -> Result<String, ProcessError> {
        let program = invocation.program.clone();
        debug!(command = %invocation.display(), "Running");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(self.cwd())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::MissingOutputPipe {
                program: program.clone(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::MissingOutputPipe {
                program: program.clone(),
            })?;

        let buffer = Arc::new(Mutex::new(String::new()));
        let mut out_task = tokio::spawn(pump(stdout, buffer.clone()));
        let mut err_task = tokio::spawn(pump(stderr, buffer.clone()));

        let status = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status),
                Err(_) => {
                    warn!(command = %invocation.display(), "Timed out after {}s, killing", limit.as_secs());
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill {}: {}", program, e);
                    }
                    None
                }
            },
            None => Some(child.wait().await),
        };

        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            let _ = (&mut out_task).await;
            let _ = (&mut err_task).await;
        })
        .await;
        if drained.is_err() {
            out_task.abort();
            err_task.abort();
        }
        let output = std::mem::take(&mut *buffer.lock().await);

        match status {
            None => Err(ProcessError::TimedOut {
                program,
                timeout: invocation.timeout.unwrap_or_default(),
                output,
            }),
            Some(Err(source)) => Err(ProcessError::Wait { program, source }),
            Some(Ok(status)) if status.success() => Ok(output),
            Some(Ok(status)) => Err(ProcessError::NonZeroExit {
                program,
                code: status.code().unwrap_or(-1),
                output,
            }),
        }
    }
}

/// Copy lines from a pipe into the shared output buffer until EOF.
async fn pump<R: AsyncRead + Unpin>(reader: R, buffer: Arc<Mutex<String>>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => buffer
                .lock()
                .await
                .push_str(&String::from_utf8_lossy(&line)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for orchestrator tests.

    use super::*;
    use std::sync::Mutex as StdMutex;

    type Handler = dyn Fn(&Invocation, &Path) -> Result<String, ProcessError> + Send + Sync;

    /// Records every invocation and answers through a handler closure that
    /// also sees the working directory, so it can create files like a real
    /// tool would.
    pub struct FakeRunner {
        cwd: StdMutex<PathBuf>,
        handler: Box<Handler>,
        calls: StdMutex<Vec<Invocation>>,
    }

    impl FakeRunner {
        pub fn new<F>(cwd: impl Into<PathBuf>, handler: F) -> Self
        where
            F: Fn(&Invocation, &Path) -> Result<String, ProcessError> + Send + Sync + 'static,
        {
            Self {
                cwd: StdMutex::new(cwd.into()),
                handler: Box::new(handler),
                calls: StdMutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
            self.calls()
                .into_iter()
                .filter(|c| c.program == program)
                .collect()
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        fn chdir(&self, path: &Path) {
            *self.cwd.lock().unwrap() = path.to_path_buf();
        }

        fn cwd(&self) -> PathBuf {
            self.cwd.lock().unwrap().clone()
        }

        async fn run(&self, invocation: &Invocation) -> Result<String, ProcessError> {
            self.calls.lock().unwrap().push(invocation.clone());
            let cwd = self.cwd();
            (self.handler)(invocation, &cwd)
        }
    }

    pub fn exit_with(program: &str, code: i32, output: &str) -> ProcessError {
        ProcessError::NonZeroExit {
            program: program.to_string(),
            code,
            output: output.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("go")
            .args(["test", "./..."])
            .arg("-v")
            .env("VCR_MODE", "REPLAYING")
            .env("VCR_MODE", "RECORDING")
            .timeout(Duration::from_secs(5));
        assert_eq!(inv.display(), "go test ./... -v");
        assert_eq!(inv.env_value("VCR_MODE"), Some("RECORDING"));
        assert_eq!(inv.env_value("MISSING"), None);
        assert_eq!(inv.timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_run_captures_combined_output() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let out = runner
            .run(&Invocation::new("sh").args(["-c", "echo out; echo err 1>&2"]))
            .await
            .unwrap();
        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[tokio::test]
    async fn test_run_non_zero_exit_keeps_output() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let err = runner
            .run(&Invocation::new("sh").args(["-c", "echo '--- FAIL: TestAccX (0.01s)'; exit 3"]))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.output().contains("--- FAIL: TestAccX"));
    }

    #[tokio::test]
    async fn test_run_passes_environment() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let out = runner
            .run(
                &Invocation::new("sh")
                    .args(["-c", "echo $VCR_MODE"])
                    .env("VCR_MODE", "RECORDING"),
            )
            .await
            .unwrap();
        assert_eq!(out.trim(), "RECORDING");
    }

    #[tokio::test]
    async fn test_run_timeout_kills_and_keeps_partial_output() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let err = runner
            .run(
                &Invocation::new("sh")
                    .args(["-c", "echo started; exec sleep 30"])
                    .timeout(Duration::from_millis(500)),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.output().contains("started"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let err = runner
            .run(&Invocation::new("definitely-not-a-real-program-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_chdir_affects_later_invocations_and_write_file() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("repo");
        std::fs::create_dir_all(&sub).unwrap();
        let runner = CommandRunner::new(dir.path());
        runner.chdir(Path::new("repo"));
        assert_eq!(runner.cwd(), sub);

        runner.write_file("sa_key.json", "{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(sub.join("sa_key.json")).unwrap(), "{}");

        let out = runner.run(&Invocation::new("ls")).await.unwrap();
        assert!(out.contains("sa_key.json"));
    }

    #[tokio::test]
    async fn test_must_run_maps_to_precondition_failure() {
        let dir = tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let err = runner
            .must_run(&Invocation::new("sh").args(["-c", "exit 1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::Precondition { .. }));
    }
}
