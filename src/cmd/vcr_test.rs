//! Full pipeline command — `vcr-orchestrator vcr-test`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use super::super::Cli;
use vcr_orchestrator::config::{PolicyConfig, RunParams};

pub async fn cmd_vcr_test(cli: &Cli, params: &RunParams, store_root: Option<&Path>) -> Result<i32> {
    use vcr_orchestrator::orchestrator::{Collaborators, PhaseController};
    use vcr_orchestrator::process::{CommandRunner, ProcessRunner};
    use vcr_orchestrator::report::GithubStatusClient;
    use vcr_orchestrator::source::GitSource;
    use vcr_orchestrator::store::{FsObjectStore, GsutilStore, ObjectStore};

    let policy = PolicyConfig::load_or_default(cli.config.as_deref())?;
    let config = params
        .validate(policy)
        .context("Invalid run parameters")?;

    let runner: Arc<dyn ProcessRunner> = Arc::new(CommandRunner::new(config.gopath.clone()));
    let store: Arc<dyn ObjectStore> = match store_root {
        Some(root) => {
            tracing::info!("Using local object store at {}", root.display());
            Arc::new(FsObjectStore::new(root))
        }
        None => Arc::new(GsutilStore::new(
            runner.clone(),
            config.policy.tools.gsutil.clone(),
        )),
    };
    let source = Arc::new(GitSource::new(
        runner.clone(),
        config.policy.tools.git.clone(),
    ));
    let status = Arc::new(GithubStatusClient::new(
        config.policy.status.api_url.clone(),
        config.policy.status.repo.clone(),
        config.github_token.clone(),
    ));

    let controller = PhaseController::new(
        config,
        Collaborators {
            runner,
            store,
            source,
            status,
        },
    );
    let outcome = controller.run().await.context("Orchestration aborted")?;

    let states: Vec<String> = outcome.states.iter().map(|s| s.to_string()).collect();
    tracing::info!(
        verdict = ?outcome.verdict.kind,
        states = %states.join(" -> "),
        "Run finished"
    );
    Ok(outcome.verdict.kind.exit_code())
}
