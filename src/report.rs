//! Build status reporting and verdict hand-off.
//!
//! `ReportSink` posts one `pending` status before replaying starts and one
//! terminal status at the end. The structured run record goes to every
//! configured `VerdictSink`; rendering it as a PR comment happens
//! downstream.

use crate::errors::ReportError;
use crate::model::{PhaseReport, Verdict, VerdictKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// State carried by a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
}

impl StatusState {
    pub fn for_verdict(kind: VerdictKind) -> Option<Self> {
        match kind {
            VerdictKind::Pass => Some(StatusState::Success),
            VerdictKind::Fail | VerdictKind::Crash => Some(StatusState::Failure),
            VerdictKind::Skipped => None,
        }
    }
}

/// One commit status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub context: String,
    pub target_url: String,
    pub state: StatusState,
    #[serde(skip)]
    pub commit_sha: String,
}

#[async_trait]
pub trait StatusService: Send + Sync {
    async fn post_status(&self, update: &StatusUpdate) -> Result<(), ReportError>;
}

/// Posts commit statuses through the GitHub REST API.
pub struct GithubStatusClient {
    client: reqwest::Client,
    api_url: String,
    repo: String,
    token: Option<String>,
}

impl GithubStatusClient {
    pub fn new(api_url: impl Into<String>, repo: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repo: repo.into(),
            token,
        }
    }

    pub fn statuses_url(&self, commit_sha: &str) -> String {
        format!("{}/repos/{}/statuses/{}", self.api_url, self.repo, commit_sha)
    }
}

#[async_trait]
impl StatusService for GithubStatusClient {
    async fn post_status(&self, update: &StatusUpdate) -> Result<(), ReportError> {
        let mut request = self
            .client
            .post(self.statuses_url(&update.commit_sha))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "vcr-orchestrator")
            .json(update);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// The structured record of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub pr_number: String,
    pub commit_sha: String,
    pub build_id: String,
    pub target_url: String,
    /// Browser URL prefix that each result's relative log paths hang off
    pub artifact_url: String,
    pub reports: Vec<PhaseReport>,
    pub verdict: Verdict,
    pub finished_at: DateTime<Utc>,
}

/// Receives the structured verdict.
#[async_trait]
pub trait VerdictSink: Send + Sync {
    async fn deliver(&self, record: &RunRecord) -> Result<(), ReportError>;
}

/// Writes the run record as pretty JSON.
pub struct JsonVerdictFile {
    path: PathBuf,
}

impl JsonVerdictFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl VerdictSink for JsonVerdictFile {
    async fn deliver(&self, record: &RunRecord) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| ReportError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Posts statuses for one run and hands off its verdict.
pub struct ReportSink {
    status: Arc<dyn StatusService>,
    sinks: Vec<Arc<dyn VerdictSink>>,
    context: String,
    target_url: String,
    commit_sha: String,
    terminal_posted: AtomicBool,
}

impl ReportSink {
    pub fn new(
        status: Arc<dyn StatusService>,
        context: impl Into<String>,
        target_url: impl Into<String>,
        commit_sha: impl Into<String>,
    ) -> Self {
        Self {
            status,
            sinks: Vec::new(),
            context: context.into(),
            target_url: target_url.into(),
            commit_sha: commit_sha.into(),
            terminal_posted: AtomicBool::new(false),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn VerdictSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    fn update(&self, state: StatusState) -> StatusUpdate {
        StatusUpdate {
            context: self.context.clone(),
            target_url: self.target_url.clone(),
            state,
            commit_sha: self.commit_sha.clone(),
        }
    }

    /// Intermediate status posted before replaying. Failure is logged only.
    pub async fn pending(&self) {
        if let Err(e) = self.status.post_status(&self.update(StatusState::Pending)).await {
            warn!("Error posting pending build status: {}", e);
        }
    }

    /// Post the terminal status. Only the first call posts.
    pub async fn terminal(&self, state: StatusState) -> Result<(), ReportError> {
        if self.terminal_posted.swap(true, Ordering::SeqCst) {
            warn!("Terminal status already posted, ignoring {:?}", state);
            return Ok(());
        }
        info!("Posting {:?} build status", state);
        self.status.post_status(&self.update(state)).await
    }

    /// Hand the record to every sink, then post the terminal status for its
    /// verdict. Sink failures are logged; a status failure is returned.
    pub async fn report(&self, record: &RunRecord) -> Result<(), ReportError> {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(record).await {
                warn!("Error delivering verdict: {}", e);
            }
        }
        match StatusState::for_verdict(record.verdict.kind) {
            Some(state) => self.terminal(state).await,
            None => Ok(()),
        }
    }
}
