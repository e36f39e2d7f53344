//! The phase controller.
//!
//! Prepares the downstream checkout, then drives
//! `Replaying -> Recording -> VerifyReplay -> Done`, aborting on a crash or
//! an infrastructure failure. Phases run strictly one after another; each
//! per-test phase gets its own worker pool that is joined before the next
//! phase starts.

use super::pool::{PoolOutcome, run_bounded};
use super::state::{RunState, StateLog};
use crate::cassettes::{BranchLineage, CassetteSnapshot, CassetteStore, stage_files};
use crate::config::VcrConfig;
use crate::errors::{InfrastructureError, OrchestratorError, ProcessError, StoreError};
use crate::model::{
    Outcome, Phase, PhaseReport, TestCase, TestResult, Verdict, VerdictKind,
};
use crate::parser::{RepetitionTally, is_build_failure, parse, tally};
use crate::process::{Invocation, ProcessRunner};
use crate::report::{JsonVerdictFile, ReportSink, RunRecord, StatusService, StatusState};
use crate::source::{GateDecision, SourceControl, gate_decision};
use crate::store::{ArtifactLayout, CopyOptions, ObjectStore};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Extra time granted past the test tool's own `-timeout` before the
/// process is killed.
const KILL_GRACE: Duration = Duration::from_secs(5 * 60);

const GOOGLE_REGION: &str = "us-central1";
const GOOGLE_ZONE: &str = "us-central1-a";

/// Staging directory for cassettes touched while recording.
const PUBLISH_DIR: &str = "recorded_cassettes";
const VERDICT_FILE: &str = "verdict.json";

/// Lines of build output kept in a build failure message.
const BUILD_OUTPUT_TAIL: usize = 20;

/// External services the controller drives.
pub struct Collaborators {
    pub runner: Arc<dyn ProcessRunner>,
    pub store: Arc<dyn ObjectStore>,
    pub source: Arc<dyn SourceControl>,
    pub status: Arc<dyn StatusService>,
}

/// Result of a completed orchestration.
#[derive(Debug)]
pub struct RunOutcome {
    pub verdict: Verdict,
    pub reports: Vec<PhaseReport>,
    pub states: Vec<RunState>,
}

/// Captured result of one test-tool invocation.
struct Execution {
    output: String,
    exit_code: i32,
    timed_out: bool,
}

impl Execution {
    fn capture(result: Result<String, ProcessError>) -> Self {
        match result {
            Ok(output) => Self {
                output,
                exit_code: 0,
                timed_out: false,
            },
            Err(e) => {
                let output = if e.output().is_empty() {
                    format!("Error running tests: {}\n", e)
                } else {
                    e.output().to_string()
                };
                Self {
                    output,
                    exit_code: e.exit_code(),
                    timed_out: e.is_timeout(),
                }
            }
        }
    }
}

/// One test's run within a per-test phase.
struct TestRun {
    test: TestCase,
    output: String,
    exit_code: i32,
    timed_out: bool,
    crashed: bool,
}

/// Runs a single test from a shared invocation template and keeps its
/// build log.
#[derive(Clone)]
struct TestJob {
    runner: Arc<dyn ProcessRunner>,
    template: Invocation,
    phase: Phase,
    log_dir: PathBuf,
}

impl TestJob {
    async fn run(self, test: TestCase) -> TestRun {
        let invocation = self
            .template
            .clone()
            .arg(format!("-run={}", test.run_pattern()));
        info!(phase = %self.phase, test = %test, "Running test");
        let exec = Execution::capture(self.runner.run(&invocation).await);

        let log = self.log_dir.join(self.phase.per_test_log_name(&test));
        if let Err(e) = tokio::fs::write(&log, &exec.output).await {
            warn!("Error writing {}: {}", log.display(), e);
        }

        let crashed = parse(&exec.output, self.phase).crash.is_some();
        TestRun {
            test,
            output: exec.output,
            exit_code: exec.exit_code,
            timed_out: exec.timed_out,
            crashed,
        }
    }
}

/// Drives one orchestration run.
pub struct PhaseController {
    config: VcrConfig,
    runner: Arc<dyn ProcessRunner>,
    store: Arc<dyn ObjectStore>,
    source: Arc<dyn SourceControl>,
    cassettes: CassetteStore,
    layout: ArtifactLayout,
    reporter: ReportSink,
    states: StateLog,
    reports: Vec<PhaseReport>,
}

impl PhaseController {
    pub fn new(config: VcrConfig, collaborators: Collaborators) -> Self {
        let layout = ArtifactLayout::new(&config);
        let cassettes = CassetteStore::new(
            collaborators.store.clone(),
            layout.clone(),
            config.policy.storage.standalone_branches.clone(),
        );
        let reporter = ReportSink::new(
            collaborators.status,
            config.policy.status.context.clone(),
            config.target_url(),
            config.commit_sha.clone(),
        )
        .with_sink(Arc::new(JsonVerdictFile::new(
            config.local_path().join(VERDICT_FILE),
        )));

        Self {
            config,
            runner: collaborators.runner,
            store: collaborators.store,
            source: collaborators.source,
            cassettes,
            layout,
            reporter,
            states: StateLog::default(),
            reports: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.states.current()
    }

    fn transition(&mut self, next: RunState) {
        let from = self.states.current();
        if self.states.advance(next) {
            info!("State {} -> {}", from, next);
        } else {
            warn!("Ignoring invalid transition {} -> {}", from, next);
        }
    }

    /// Run every phase the results call for and report the verdict.
    pub async fn run(mut self) -> Result<RunOutcome, OrchestratorError> {
        let packages = match self.prepare().await {
            Ok(Some(packages)) => packages,
            Ok(None) => {
                info!("Skipping tests: no relevant files changed");
                self.transition(RunState::Done);
                return Ok(self.outcome(Verdict::skipped()));
            }
            Err(e) => return Err(self.fail(e.into()).await),
        };

        self.reporter.pending().await;

        let replay = match self.replay(&packages).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        let failed_replay = replay.failed();
        let crashed = replay.is_crashed();
        self.reports.push(replay);
        if crashed {
            error!("The provider crashed while running the VCR tests in REPLAYING mode");
            return self.finish().await;
        }
        if failed_replay.is_empty() {
            return self.finish().await;
        }
        info!(
            "Found {} affected test(s) by replaying; starting RECORDING",
            failed_replay.len()
        );

        let recording = match self.record(&failed_replay, &packages).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e).await),
        };
        let passed_recording: BTreeSet<TestCase> = failed_replay
            .intersection(&recording.passed())
            .cloned()
            .collect();
        let crashed = recording.is_crashed();
        self.reports.push(recording);
        if crashed {
            error!("The provider crashed while running the VCR tests in RECORDING mode");
            return self.finish().await;
        }
        if passed_recording.is_empty() {
            return self.finish().await;
        }

        let verify = match self.verify(&passed_recording, &packages).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e).await),
        };
        if verify.is_crashed() {
            error!("The provider crashed while replaying the new recordings");
        }
        self.reports.push(verify);
        self.finish().await
    }

    fn outcome(self, verdict: Verdict) -> RunOutcome {
        RunOutcome {
            verdict,
            reports: self.reports,
            states: self.states.states(),
        }
    }

    /// Abort on an error that leaves no verdict, posting failure.
    async fn fail(&mut self, err: OrchestratorError) -> OrchestratorError {
        error!("Aborting: {}", err);
        self.transition(RunState::Aborted);
        if let Err(e) = self.reporter.terminal(StatusState::Failure).await {
            warn!("Error posting failure status: {}", e);
        }
        err
    }

    async fn finish(mut self) -> Result<RunOutcome, OrchestratorError> {
        let verdict = Verdict::fold(&self.reports);
        self.transition(match verdict.kind {
            VerdictKind::Crash => RunState::Aborted,
            _ => RunState::Done,
        });
        log_verdict(&verdict);

        let record = RunRecord {
            pr_number: self.config.pr_number.clone(),
            commit_sha: self.config.commit_sha.clone(),
            build_id: self.config.build_id.clone(),
            target_url: self.config.target_url(),
            artifact_url: self.layout.public_url(""),
            reports: self.reports.clone(),
            verdict: verdict.clone(),
            finished_at: Utc::now(),
        };
        let reported = self.reporter.report(&record).await;
        self.upload_run_artifacts().await;
        reported?;

        Ok(self.outcome(verdict))
    }

    // ── Preparation ─────────────────────────────────────────────────────

    /// Everything before the first phase. `None` means the change gate
    /// decided nothing needs to run.
    async fn prepare(&self) -> Result<Option<Vec<String>>, InfrastructureError> {
        let local_path = self.config.local_path();
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| InfrastructureError::Workspace {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let remote = self.config.git_remote();
        let branch = self.config.pr_branch();
        info!("Cloning {} ({}) into {}", remote, branch, local_path.display());
        self.source
            .clone_branch(
                &remote,
                &branch,
                &local_path,
                self.config.policy.repository.clone_depth,
            )
            .await?;
        self.runner.chdir(&local_path);

        let changed = self.source.changed_files(&local_path).await;
        if gate_decision(&changed, &self.config.policy.gate) == GateDecision::Skip {
            return Ok(None);
        }

        self.fetch_cassettes().await?;
        self.activate_credentials().await?;
        self.create_log_dirs().await?;
        let packages = self.discover_packages().await?;

        let version = self
            .runner
            .must_run(&Invocation::new(&self.config.policy.tools.terraform).arg("version"))
            .await?;
        info!("Terraform version: {}", version.trim());

        self.build(&packages).await?;
        Ok(Some(packages))
    }

    async fn fetch_cassettes(&self) -> Result<(), InfrastructureError> {
        let lineage = BranchLineage::new(&self.config.base_branch, self.config.pr_branch());
        match self
            .cassettes
            .fetch(&lineage, &self.config.fixtures_dir())
            .await
        {
            Ok(dir) => {
                info!("Cassettes ready in {}", dir.display());
                Ok(())
            }
            Err(StoreError::Io { path, source }) => {
                Err(InfrastructureError::Workspace { path, source })
            }
            Err(e) => {
                warn!("Cassette fetch incomplete: {}", e);
                Ok(())
            }
        }
    }

    async fn activate_credentials(&self) -> Result<(), InfrastructureError> {
        let (Some(key), Some(account)) = (
            &self.config.sa_key,
            &self.config.google_service_account,
        ) else {
            warn!("Service account not configured, skipping credential activation");
            return Ok(());
        };

        let key_path = self.config.sa_key_path();
        self.runner
            .write_file("sa_key.json", key)
            .await
            .map_err(|source| InfrastructureError::Workspace {
                path: key_path.clone(),
                source,
            })?;

        let mut invocation = Invocation::new(&self.config.policy.tools.gcloud)
            .args(["auth", "activate-service-account", account.as_str()])
            .arg(format!("--key-file={}", key_path.display()));
        if let Some(project) = &self.config.google_project {
            invocation = invocation.arg(format!("--project={}", project));
        }
        self.runner
            .run(&invocation)
            .await
            .map(|_| ())
            .map_err(|source| InfrastructureError::Auth { source })
    }

    async fn create_log_dirs(&self) -> Result<(), InfrastructureError> {
        let testlog = self.config.testlog_dir();
        let phases = [Phase::Replaying, Phase::Recording, Phase::VerifyReplay];
        let dirs = phases
            .iter()
            .flat_map(|p| std::iter::once(p.debug_log_dir()).chain(p.build_log_dir()));
        for dir in dirs {
            let path = testlog.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|source| InfrastructureError::Workspace { path, source })?;
        }
        Ok(())
    }

    async fn discover_packages(&self) -> Result<Vec<String>, InfrastructureError> {
        let output = self
            .runner
            .run(&Invocation::new(&self.config.policy.tools.go).args(["list", "./..."]))
            .await
            .map_err(|e| InfrastructureError::Build {
                message: format!("listing packages failed: {}", e),
            })?;

        let excluded = &self.config.policy.repository.excluded_package;
        let packages: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| excluded.is_empty() || !line.contains(excluded.as_str()))
            .map(String::from)
            .collect();
        if packages.is_empty() {
            return Err(InfrastructureError::Build {
                message: "no test packages found".to_string(),
            });
        }
        info!("Testing {} package(s)", packages.len());
        Ok(packages)
    }

    async fn build(&self, packages: &[String]) -> Result<(), InfrastructureError> {
        let invocation = Invocation::new(&self.config.policy.tools.go)
            .arg("build")
            .args(packages.iter().cloned());
        self.runner.run(&invocation).await.map(|_| ()).map_err(|e| {
            error!("Skipping tests: Build failure detected");
            InfrastructureError::Build {
                message: format!("{}\n{}", e, output_tail(e.output())),
            }
        })
    }

    // ── Phases ─────────────────────────────────────────────────────────

    async fn replay(&mut self, packages: &[String]) -> Result<PhaseReport, InfrastructureError> {
        self.transition(RunState::Replaying);
        let phase = Phase::Replaying;
        let execution = &self.config.policy.execution;
        let started = Utc::now();

        let invocation = self.go_test(
            phase,
            packages,
            execution.replay_parallelism,
            execution.replay_timeout(),
            &[format!("-run={}", execution.test_filter)],
        );
        let exec = Execution::capture(self.runner.run(&invocation).await);
        self.write_aggregate_log(phase, &exec.output).await;
        self.upload_phase_logs(phase).await;

        let parsed = parse(&exec.output, phase);
        if parsed.crash.is_none() && exec.exit_code != 0 && is_build_failure(&exec.output) {
            return Err(InfrastructureError::Build {
                message: format!("test packages failed to build\n{}", output_tail(&exec.output)),
            });
        }

        let mut report = PhaseReport::new(phase, started);
        report.results = parsed.results;
        report.crash = parsed.crash;
        report.exit_code = exec.exit_code;
        report.timed_out = exec.timed_out;
        report.finished_at = Utc::now();
        log_phase(&report);
        Ok(report)
    }

    async fn record(
        &mut self,
        failed_replay: &BTreeSet<TestCase>,
        packages: &[String],
    ) -> Result<PhaseReport, OrchestratorError> {
        self.transition(RunState::Recording);
        let phase = Phase::Recording;
        let started = Utc::now();
        let fixtures = self.config.fixtures_dir();
        let before = snapshot(&fixtures).await;

        let tests: Vec<TestCase> = failed_replay.iter().cloned().collect();
        let outcome = self
            .run_per_test(
                phase,
                &tests,
                packages,
                self.config.policy.execution.record_workers,
                self.config.policy.execution.record_timeout(),
                &[],
            )
            .await?;

        let aggregate = concat_outputs(&outcome);
        self.write_aggregate_log(phase, &aggregate).await;
        self.upload_phase_logs(phase).await;

        // Partial progress is still worth keeping, so publish whatever was
        // touched before looking at outcomes.
        if let Some(before) = before {
            self.publish_touched(&fixtures, &before).await;
        }

        let parsed = parse(&aggregate, phase);
        let mut report = per_test_report(phase, started, &outcome);
        report.unresolved = tests
            .iter()
            .filter(|t| parsed.outcome_of(t).is_none())
            .cloned()
            .collect();
        report.results = parsed.results;
        report.crash = parsed.crash;
        log_phase(&report);
        Ok(report)
    }

    async fn verify(
        &mut self,
        passed_recording: &BTreeSet<TestCase>,
        packages: &[String],
    ) -> Result<PhaseReport, OrchestratorError> {
        self.transition(RunState::VerifyReplay);
        let phase = Phase::VerifyReplay;
        let started = Utc::now();
        let repetitions = self.config.policy.execution.verify_repetitions;

        let tests: Vec<TestCase> = passed_recording.iter().cloned().collect();
        let outcome = self
            .run_per_test(
                phase,
                &tests,
                packages,
                self.config.policy.execution.verify_workers,
                self.config.policy.execution.verify_timeout(),
                &[format!("-count={}", repetitions)],
            )
            .await?;

        let aggregate = concat_outputs(&outcome);
        self.write_aggregate_log(phase, &aggregate).await;
        self.upload_phase_logs(phase).await;

        let mut report = per_test_report(phase, started, &outcome);
        report.crash = parse(&aggregate, phase).crash;
        for run in &outcome.completed {
            match tally(&run.output).get(&run.test) {
                Some(counts) => {
                    info!(
                        test = %run.test,
                        passed = counts.passed,
                        failed = counts.failed,
                        skipped = counts.skipped,
                        "Verify repetitions"
                    );
                    report.results.push(TestResult::new(
                        run.test.clone(),
                        repetition_outcome(counts, repetitions),
                        phase,
                    ));
                }
                None => report.unresolved.push(run.test.clone()),
            }
        }
        // Dispatch is in order, so the undispatched tests are the tail.
        report.unresolved.extend(
            tests[tests.len() - outcome.not_dispatched..]
                .iter()
                .cloned(),
        );
        log_phase(&report);
        Ok(report)
    }

    async fn run_per_test(
        &self,
        phase: Phase,
        tests: &[TestCase],
        packages: &[String],
        workers: usize,
        timeout: Duration,
        extra_args: &[String],
    ) -> Result<PoolOutcome<TestRun>, OrchestratorError> {
        info!(
            "Running {} test(s) in {} mode with {} worker(s)",
            tests.len(),
            phase,
            workers
        );
        let job = TestJob {
            runner: self.runner.clone(),
            template: self.go_test(phase, packages, 1, timeout, extra_args),
            phase,
            log_dir: self
                .config
                .testlog_dir()
                .join(phase.build_log_dir().unwrap_or_default()),
        };
        let outcome = run_bounded(
            tests.to_vec(),
            workers,
            |test| job.clone().run(test),
            |run: &TestRun| run.crashed,
        )
        .await?;
        if outcome.halted {
            warn!(
                "Crash during {} mode; {} of {} test(s) not dispatched",
                phase,
                outcome.not_dispatched,
                tests.len()
            );
        }
        Ok(outcome)
    }

    // ── Invocations ────────────────────────────────────────────────────

    fn go_test(
        &self,
        phase: Phase,
        packages: &[String],
        parallel: usize,
        timeout: Duration,
        extra_args: &[String],
    ) -> Invocation {
        Invocation::new(&self.config.policy.tools.go)
            .arg("test")
            .args(packages.iter().cloned())
            .args(["-parallel".to_string(), parallel.to_string(), "-v".to_string()])
            .args(extra_args.iter().cloned())
            .args(["-timeout".to_string(), format!("{}m", timeout.as_secs() / 60)])
            .arg(format!(
                "-ldflags=-X={}/version.ProviderVersion=acc",
                self.config.policy.repository.module
            ))
            .envs(&self.phase_env(phase, packages))
            .timeout(timeout + KILL_GRACE)
    }

    fn phase_env(&self, phase: Phase, packages: &[String]) -> Vec<(String, String)> {
        let config = &self.config;
        let log_mask = config
            .testlog_dir()
            .join(phase.debug_log_dir())
            .join("%s.log");
        [
            ("GOOGLE_REGION", GOOGLE_REGION.to_string()),
            ("GOOGLE_ZONE", GOOGLE_ZONE.to_string()),
            ("VCR_PATH", config.fixtures_dir().display().to_string()),
            ("VCR_MODE", phase.vcr_mode().to_string()),
            (
                "ACCTEST_PARALLELISM",
                config.policy.execution.replay_parallelism.to_string(),
            ),
            ("GOOGLE_CREDENTIALS", config.sa_key.clone().unwrap_or_default()),
            (
                "GOOGLE_APPLICATION_CREDENTIALS",
                config.sa_key_path().display().to_string(),
            ),
            ("GOOGLE_TEST_DIRECTORY", packages.join("\n")),
            ("TF_LOG", "DEBUG".to_string()),
            ("TF_LOG_PATH_MASK", log_mask.display().to_string()),
            ("TF_ACC", "1".to_string()),
            ("TF_SCHEMA_PANIC_ON_ERROR", "1".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    // ── Artifacts ──────────────────────────────────────────────────────

    async fn write_aggregate_log(&self, phase: Phase, output: &str) {
        let name = phase.aggregate_log_name();
        if let Err(e) = self.runner.write_file(name, output).await {
            warn!("Error writing {}: {}", name, e);
        }
    }

    /// Best-effort upload of a phase's build and debug logs.
    async fn upload_phase_logs(&self, phase: Phase) {
        let testlog = self.config.testlog_dir();
        let mut uploads = vec![(
            self.config
                .local_path()
                .join(phase.aggregate_log_name())
                .display()
                .to_string(),
            "build-log/".to_string(),
        )];
        if let Some(dir) = phase.build_log_dir() {
            uploads.push((
                format!("{}/*", testlog.join(dir).display()),
                format!("build-log/{}/", dir),
            ));
        }
        let debug = phase.debug_log_dir();
        uploads.push((
            format!("{}/*", testlog.join(debug).display()),
            format!("{}/", debug),
        ));

        for (src, relative) in uploads {
            let dst = self.layout.log_path(&relative);
            if let Err(e) = self.store.copy(&src, &dst, CopyOptions::text()).await {
                warn!("Error uploading {}: {}", src, e);
            }
        }
    }

    async fn upload_run_artifacts(&self) {
        let artifacts = [
            self.config.local_path().join(VERDICT_FILE),
            self.config.orchestrator_log(),
        ];
        let dst = self.layout.log_path("build-log/");
        for path in artifacts.iter().filter(|p| p.exists()) {
            let src = path.display().to_string();
            if let Err(e) = self.store.copy(&src, &dst, CopyOptions::text()).await {
                warn!("Error uploading {}: {}", src, e);
            }
        }
    }

    async fn publish_touched(&self, fixtures: &Path, before: &CassetteSnapshot) {
        let Some(after) = snapshot(fixtures).await else {
            return;
        };
        let touched = after.touched_since(before);
        if touched.is_empty() {
            info!("No cassettes changed while recording");
            return;
        }

        let staging = self.config.local_path().join(PUBLISH_DIR);
        let (from, to) = (fixtures.to_path_buf(), staging.clone());
        let staged = tokio::task::spawn_blocking(move || stage_files(&from, &touched, &to)).await;
        match staged {
            Ok(Ok(count)) => info!("Staged {} recorded cassette(s)", count),
            Ok(Err(e)) => {
                warn!("Error staging cassettes: {}", e);
                return;
            }
            Err(e) => {
                warn!("Cassette staging task failed: {}", e);
                return;
            }
        }

        if let Err(e) = self
            .cassettes
            .publish(&staging, &self.config.pr_branch())
            .await
        {
            warn!("Error uploading cassettes: {}", e);
        }
    }
}

async fn snapshot(dir: &Path) -> Option<CassetteSnapshot> {
    let dir = dir.to_path_buf();
    match tokio::task::spawn_blocking(move || CassetteSnapshot::capture(&dir)).await {
        Ok(Ok(snapshot)) => Some(snapshot),
        Ok(Err(e)) => {
            warn!("Error reading cassettes: {}", e);
            None
        }
        Err(e) => {
            warn!("Cassette snapshot task failed: {}", e);
            None
        }
    }
}

fn concat_outputs(outcome: &PoolOutcome<TestRun>) -> String {
    outcome
        .completed
        .iter()
        .map(|run| run.output.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Report skeleton carrying the exit status of a per-test phase.
fn per_test_report(
    phase: Phase,
    started: chrono::DateTime<Utc>,
    outcome: &PoolOutcome<TestRun>,
) -> PhaseReport {
    let mut report = PhaseReport::new(phase, started);
    report.exit_code = outcome
        .completed
        .iter()
        .map(|run| run.exit_code)
        .find(|code| *code != 0)
        .unwrap_or(0);
    report.timed_out = outcome.completed.iter().any(|run| run.timed_out);
    report.finished_at = Utc::now();
    report
}

fn repetition_outcome(counts: &RepetitionTally, repetitions: u32) -> Outcome {
    if counts.passed_all(repetitions) {
        Outcome::Pass
    } else if counts.failed > 0 || counts.passed > 0 {
        Outcome::Fail
    } else {
        Outcome::Skip
    }
}

fn output_tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(BUILD_OUTPUT_TAIL);
    lines[start..].join("\n")
}

fn log_phase(report: &PhaseReport) {
    let totals = report.totals();
    info!(
        phase = %report.phase,
        passed = totals.passed,
        failed = totals.failed,
        skipped = totals.skipped,
        unresolved = report.unresolved.len(),
        exit_code = report.exit_code,
        timed_out = report.timed_out,
        "Phase finished"
    );
    if report.has_uncaught_errors() {
        warn!("Errors occurred during {} mode", report.phase);
    }
}

fn log_verdict(verdict: &Verdict) {
    info!(
        verdict = ?verdict.kind,
        total = verdict.replay_totals.total(),
        passed = verdict.replay_totals.passed,
        skipped = verdict.replay_totals.skipped,
        affected = verdict.failed_replay.len(),
        "Tests analytics"
    );
    if !verdict.recovered.is_empty() {
        info!("Recovered after recording: {}", join_tests(&verdict.recovered));
    }
    if !verdict.failed_recording.is_empty() {
        warn!("Failed in RECORDING mode: {}", join_tests(&verdict.failed_recording));
    }
    if !verdict.failed_verify.is_empty() {
        warn!(
            "Failed when replaying new recordings: {}",
            join_tests(&verdict.failed_verify)
        );
    }
}

fn join_tests(tests: &BTreeSet<TestCase>) -> String {
    tests
        .iter()
        .map(TestCase::name)
        .collect::<Vec<_>>()
        .join(", ")
}
