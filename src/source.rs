//! Source control: cloning the downstream branch and reporting what the
//! latest commit changed.

use crate::config::GatePolicy;
use crate::errors::InfrastructureError;
use crate::process::{Invocation, ProcessRunner};
use anyhow::{Context, Result};
use async_trait::async_trait;
use git2::Repository;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Shallow-clone `branch` of `remote` into `dest`.
    async fn clone_branch(
        &self,
        remote: &str,
        branch: &str,
        dest: &Path,
        depth: u32,
    ) -> Result<(), InfrastructureError>;

    /// Paths changed by the HEAD commit of the repository at `repo`.
    async fn changed_files(&self, repo: &Path) -> Result<Vec<String>>;
}

/// Clones with the git CLI (shallow clones) and diffs with libgit2.
pub struct GitSource {
    runner: Arc<dyn ProcessRunner>,
    git: String,
}

impl GitSource {
    pub fn new(runner: Arc<dyn ProcessRunner>, git: impl Into<String>) -> Self {
        Self {
            runner,
            git: git.into(),
        }
    }
}

#[async_trait]
impl SourceControl for GitSource {
    async fn clone_branch(
        &self,
        remote: &str,
        branch: &str,
        dest: &Path,
        depth: u32,
    ) -> Result<(), InfrastructureError> {
        let invocation = Invocation::new(&self.git).args([
            "clone".to_string(),
            remote.to_string(),
            dest.display().to_string(),
            "--branch".to_string(),
            branch.to_string(),
            "--depth".to_string(),
            depth.to_string(),
        ]);
        self.runner
            .run(&invocation)
            .await
            .map(|_| ())
            .map_err(|source| InfrastructureError::Clone {
                remote: remote.to_string(),
                branch: branch.to_string(),
                source,
            })
    }

    async fn changed_files(&self, repo: &Path) -> Result<Vec<String>> {
        let repo = repo.to_path_buf();
        tokio::task::spawn_blocking(move || head_commit_changes(&repo))
            .await
            .context("Diff task panicked")?
    }
}

/// Files changed between HEAD~1 and HEAD.
pub fn head_commit_changes(repo_dir: &Path) -> Result<Vec<String>> {
    let repo = Repository::open(repo_dir).context("Failed to open git repository")?;
    let head = repo
        .head()
        .and_then(|h| h.peel_to_commit())
        .context("Failed to resolve HEAD commit")?;
    let parent = head
        .parent(0)
        .context("HEAD has no parent commit to diff against")?;

    let diff = repo
        .diff_tree_to_tree(Some(&parent.tree()?), Some(&head.tree()?), None)
        .context("Failed to diff HEAD against its parent")?;

    let files = diff
        .deltas()
        .filter_map(|delta| {
            delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().to_string())
        })
        .collect();
    Ok(files)
}

/// Whether to run the phases for a set of changed files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run { reason: String },
    Skip,
}

/// Skip only when the change list is known and nothing in it is relevant.
/// An unknown change list runs everything.
pub fn gate_decision(changed: &Result<Vec<String>>, gate: &GatePolicy) -> GateDecision {
    if !gate.skip_when_unchanged {
        return GateDecision::Run {
            reason: "change gate disabled".to_string(),
        };
    }
    match changed {
        Err(e) => {
            warn!("Could not determine changed files, running tests anyway: {:#}", e);
            GateDecision::Run {
                reason: "changed files unknown".to_string(),
            }
        }
        Ok(files) => match files.iter().find(|f| gate.is_relevant(f)) {
            Some(file) => {
                info!("Running tests: {} changed", file);
                GateDecision::Run {
                    reason: format!("{} changed", file),
                }
            }
            None => GateDecision::Skip,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{FakeRunner, exit_with};
    use git2::Signature;
    use std::fs;
    use tempfile::tempdir;

    fn commit_file(repo: &Repository, dir: &Path, name: &str, body: &str, message: &str) {
        fs::write(dir.join(name), body).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("test", "test@localhost").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn test_head_commit_changes_lists_files() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, dir.path(), "README.md", "hi", "initial");
        commit_file(&repo, dir.path(), "resource.go", "package x", "add go");

        let files = head_commit_changes(dir.path()).unwrap();
        assert_eq!(files, vec!["resource.go".to_string()]);
    }

    #[test]
    fn test_head_commit_changes_without_parent_fails() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, dir.path(), "README.md", "hi", "initial");
        assert!(head_commit_changes(dir.path()).is_err());
    }

    #[test]
    fn test_gate_skips_only_on_known_irrelevant_changes() {
        let gate = GatePolicy::default();
        assert_eq!(
            gate_decision(&Ok(vec!["website/docs/x.markdown".into()]), &gate),
            GateDecision::Skip
        );
        assert!(matches!(
            gate_decision(&Ok(vec!["docs/a.md".into(), "go.sum".into()]), &gate),
            GateDecision::Run { .. }
        ));
    }

    #[test]
    fn test_gate_fails_closed_when_unknown() {
        let gate = GatePolicy::default();
        let decision = gate_decision(&Err(anyhow::anyhow!("no repo")), &gate);
        assert_eq!(
            decision,
            GateDecision::Run {
                reason: "changed files unknown".into()
            }
        );
    }

    #[test]
    fn test_gate_disabled_always_runs() {
        let gate = GatePolicy {
            skip_when_unchanged: false,
            ..Default::default()
        };
        assert!(matches!(
            gate_decision(&Ok(vec![]), &gate),
            GateDecision::Run { .. }
        ));
    }

    #[tokio::test]
    async fn test_clone_branch_invocation() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new(dir.path(), |_, _| Ok(String::new())));
        let source = GitSource::new(runner.clone(), "git");
        source
            .clone_branch("https://github.com/o/r", "auto-pr-1", Path::new("/go/src/r"), 2)
            .await
            .unwrap();
        assert_eq!(
            runner.calls()[0].args,
            vec!["clone", "https://github.com/o/r", "/go/src/r", "--branch", "auto-pr-1", "--depth", "2"]
        );
    }

    #[tokio::test]
    async fn test_clone_failure_is_infrastructure_error() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new(dir.path(), |_, _| {
            Err(exit_with("git", 128, "fatal: Remote branch auto-pr-1 not found"))
        }));
        let source = GitSource::new(runner, "git");
        let err = source
            .clone_branch("https://github.com/o/r", "auto-pr-1", Path::new("/x"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::Clone { .. }));
    }
}
