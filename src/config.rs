//! Configuration for an orchestration run.
//!
//! Two layers feed one explicit value:
//! - `RunParams` — per-build parameters from the environment (or flags)
//! - `PolicyConfig` — tunables from an optional `vcr.toml`
//!
//! `RunParams::validate` combines them into a `VcrConfig`, the only
//! configuration the orchestrator sees.
//!
//! # Policy File Format
//!
//! ```toml
//! [execution]
//! replay_parallelism = 32
//! replay_timeout_minutes = 240
//! record_workers = 16
//! verify_repetitions = 3
//!
//! [storage]
//! cassette_bucket = "ci-vcr-cassettes"
//! product = "beta"
//!
//! [gate]
//! skip_when_unchanged = true
//! ```

use crate::errors::InfrastructureError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Build parameters supplied by the CI environment.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunParams {
    #[arg(long, env = "BUILD_ID")]
    pub build_id: Option<String>,

    #[arg(long, env = "PROJECT_ID")]
    pub project_id: Option<String>,

    #[arg(long, env = "BUILD_STEP")]
    pub build_step: Option<String>,

    #[arg(long, env = "COMMIT_SHA")]
    pub commit_sha: Option<String>,

    #[arg(long, env = "PR_NUMBER")]
    pub pr_number: Option<String>,

    /// Branch the PR targets
    #[arg(long, env = "BASE_BRANCH", default_value = "main")]
    pub base_branch: String,

    /// Service account key material
    #[arg(long, env = "SA_KEY", hide_env_values = true)]
    pub sa_key: Option<String>,

    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT")]
    pub google_service_account: Option<String>,

    #[arg(long, env = "GOOGLE_PROJECT")]
    pub google_project: Option<String>,

    /// Workspace root; the downstream repo is cloned beneath it
    #[arg(long, env = "GOPATH")]
    pub gopath: Option<PathBuf>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn required(value: &Option<String>, name: &str) -> Result<String, InfrastructureError> {
    non_empty(value).ok_or_else(|| InfrastructureError::Config(format!("{} is required", name)))
}

fn optional(value: &Option<String>, name: &str) -> Option<String> {
    let value = non_empty(value);
    if value.is_none() {
        warn!("{} environment variable not set", name);
    }
    value
}

impl RunParams {
    /// Validate once at the boundary. Identifiers needed to address
    /// artifacts are required; the rest degrade to warnings.
    pub fn validate(&self, policy: PolicyConfig) -> Result<VcrConfig, InfrastructureError> {
        let build_id = required(&self.build_id, "BUILD_ID")?;
        let pr_number = required(&self.pr_number, "PR_NUMBER")?;
        let commit_sha = required(&self.commit_sha, "COMMIT_SHA")?;
        let gopath = self
            .gopath
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| InfrastructureError::Config("GOPATH is required".into()))?;

        let base_branch = if self.base_branch.trim().is_empty() {
            "main".to_string()
        } else {
            self.base_branch.clone()
        };

        let config = VcrConfig {
            build_id,
            project_id: optional(&self.project_id, "PROJECT_ID").unwrap_or_default(),
            build_step: optional(&self.build_step, "BUILD_STEP").unwrap_or_default(),
            commit_sha,
            pr_number,
            base_branch,
            sa_key: optional(&self.sa_key, "SA_KEY"),
            google_service_account: optional(&self.google_service_account, "GOOGLE_SERVICE_ACCOUNT"),
            google_project: optional(&self.google_project, "GOOGLE_PROJECT"),
            gopath,
            github_token: optional(&self.github_token, "GITHUB_TOKEN"),
            policy,
        };
        config.log_summary();
        Ok(config)
    }
}

pub const ORCHESTRATOR_LOG: &str = "orchestrator.log";

pub fn orchestrator_log_in(gopath: &Path) -> PathBuf {
    gopath.join(ORCHESTRATOR_LOG)
}

/// Tunables for phase execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    /// `-parallel` passed to the single replaying invocation
    pub replay_parallelism: usize,
    pub replay_timeout_minutes: u64,
    /// Concurrent processes while recording
    pub record_workers: usize,
    pub record_timeout_minutes: u64,
    /// Concurrent processes while re-verifying recordings
    pub verify_workers: usize,
    pub verify_repetitions: u32,
    pub verify_timeout_minutes: u64,
    /// `-run` filter selecting acceptance tests
    pub test_filter: String,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            replay_parallelism: 32,
            replay_timeout_minutes: 240,
            record_workers: 16,
            record_timeout_minutes: 240,
            verify_workers: 16,
            verify_repetitions: 3,
            verify_timeout_minutes: 120,
            test_filter: "TestAcc".to_string(),
        }
    }
}

impl ExecutionPolicy {
    pub fn replay_timeout(&self) -> Duration {
        Duration::from_secs(self.replay_timeout_minutes * 60)
    }

    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_minutes * 60)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_minutes * 60)
    }
}

/// Durable store layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePolicy {
    pub cassette_bucket: String,
    pub log_bucket: String,
    pub product: String,
    /// Base branches whose cassettes replace main's instead of overlaying them
    pub standalone_branches: Vec<String>,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            cassette_bucket: "ci-vcr-cassettes".to_string(),
            log_bucket: "ci-vcr-logs".to_string(),
            product: "beta".to_string(),
            standalone_branches: vec!["FEATURE-BRANCH-major-release-5.0.0".to_string()],
        }
    }
}

/// The downstream repository under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryPolicy {
    pub owner: String,
    pub name: String,
    /// Go module path; also the clone location under `$GOPATH/src`
    pub module: String,
    /// Packages containing this substring are not tested
    pub excluded_package: String,
    pub clone_depth: u32,
}

impl Default for RepositoryPolicy {
    fn default() -> Self {
        Self {
            owner: "modular-magician".to_string(),
            name: "terraform-provider-google-beta".to_string(),
            module: "github.com/hashicorp/terraform-provider-google-beta".to_string(),
            excluded_package: "github.com/hashicorp/terraform-provider-google-beta/scripts"
                .to_string(),
            clone_depth: 2,
        }
    }
}

/// Where build statuses are posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusPolicy {
    /// `owner/repo` receiving statuses
    pub repo: String,
    pub context: String,
    pub api_url: String,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            repo: "GoogleCloudPlatform/magic-modules".to_string(),
            context: "VCR-test".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

/// Which changes make a run worthwhile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatePolicy {
    /// Skip when the changed files are known and none is relevant
    pub skip_when_unchanged: bool,
    pub relevant_suffixes: Vec<String>,
    pub relevant_files: Vec<String>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            skip_when_unchanged: true,
            relevant_suffixes: vec![".go".to_string()],
            relevant_files: vec!["go.mod".to_string(), "go.sum".to_string()],
        }
    }
}

impl GatePolicy {
    pub fn is_relevant(&self, path: &str) -> bool {
        self.relevant_files.iter().any(|f| f == path)
            || self.relevant_suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }
}

/// External program names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsPolicy {
    pub go: String,
    pub git: String,
    pub gsutil: String,
    pub gcloud: String,
    pub terraform: String,
}

impl Default for ToolsPolicy {
    fn default() -> Self {
        Self {
            go: "go".to_string(),
            git: "git".to_string(),
            gsutil: "gsutil".to_string(),
            gcloud: "gcloud".to_string(),
            terraform: "terraform".to_string(),
        }
    }
}

/// Contents of `vcr.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub execution: ExecutionPolicy,
    pub storage: StoragePolicy,
    pub repository: RepositoryPolicy,
    pub status: StatusPolicy,
    pub gate: GatePolicy,
    pub tools: ToolsPolicy,
}

impl PolicyConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse vcr.toml")?;
        let problems = config.validate();
        if !problems.is_empty() {
            anyhow::bail!("Invalid vcr.toml: {}", problems.join("; "));
        }
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let e = &self.execution;
        if e.replay_parallelism == 0 {
            problems.push("execution.replay_parallelism must be at least 1".to_string());
        }
        if e.record_workers == 0 {
            problems.push("execution.record_workers must be at least 1".to_string());
        }
        if e.verify_workers == 0 {
            problems.push("execution.verify_workers must be at least 1".to_string());
        }
        if e.verify_repetitions == 0 {
            problems.push("execution.verify_repetitions must be at least 1".to_string());
        }
        if e.replay_timeout_minutes == 0
            || e.record_timeout_minutes == 0
            || e.verify_timeout_minutes == 0
        {
            problems.push("execution timeouts must be positive".to_string());
        }
        if self.storage.product.is_empty() {
            problems.push("storage.product must not be empty".to_string());
        }
        if !self.status.repo.contains('/') {
            problems.push(format!(
                "status.repo '{}' must be in owner/repo form",
                self.status.repo
            ));
        }
        problems
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct VcrConfig {
    pub build_id: String,
    pub project_id: String,
    pub build_step: String,
    pub commit_sha: String,
    pub pr_number: String,
    pub base_branch: String,
    pub sa_key: Option<String>,
    pub google_service_account: Option<String>,
    pub google_project: Option<String>,
    pub gopath: PathBuf,
    pub github_token: Option<String>,
    pub policy: PolicyConfig,
}

impl VcrConfig {
    /// Downstream branch generated for the PR.
    pub fn pr_branch(&self) -> String {
        format!("auto-pr-{}", self.pr_number)
    }

    pub fn git_remote(&self) -> String {
        let repo = &self.policy.repository;
        format!("https://github.com/{}/{}", repo.owner, repo.name)
    }

    /// Local checkout of the downstream repository.
    pub fn local_path(&self) -> PathBuf {
        self.gopath.join("src").join(&self.policy.repository.module)
    }

    pub fn fixtures_dir(&self) -> PathBuf {
        self.local_path().join("fixtures")
    }

    pub fn testlog_dir(&self) -> PathBuf {
        self.local_path().join("testlog")
    }

    pub fn sa_key_path(&self) -> PathBuf {
        self.local_path().join("sa_key.json")
    }

    /// Orchestrator's own log file. Lives outside the checkout, which must
    /// not exist before the clone.
    pub fn orchestrator_log(&self) -> PathBuf {
        orchestrator_log_in(&self.gopath)
    }

    /// Build console URL attached to every status update.
    pub fn target_url(&self) -> String {
        format!(
            "https://console.cloud.google.com/cloud-build/builds;region=global/{};step={}?project={}",
            self.build_id, self.build_step, self.project_id
        )
    }

    fn log_summary(&self) {
        info!(
            build_id = %self.build_id,
            project_id = %self.project_id,
            build_step = %self.build_step,
            commit_sha = %self.commit_sha,
            pr_number = %self.pr_number,
            base_branch = %self.base_branch,
            gopath = %self.gopath.display(),
            "Run parameters"
        );
    }
}
