//! Cassette retrieval and publication.
//!
//! Cassettes are layered into one local directory in increasing priority:
//! main, then the base branch (when it is not main), then the PR branch.
//! Later layers overwrite earlier ones file by file. Only cassettes the
//! recording phase touched are pushed back, and only under the PR branch.

use crate::errors::StoreError;
use crate::store::{ArtifactLayout, CopyOptions, ObjectStore};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

const MAIN_BRANCH: &str = "main";

/// The branches whose cassettes overlay each other for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchLineage {
    pub base: String,
    pub pr: String,
}

impl BranchLineage {
    pub fn new(base: impl Into<String>, pr: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            pr: pr.into(),
        }
    }
}

/// Fetches and publishes cassettes through an `ObjectStore`.
pub struct CassetteStore {
    store: Arc<dyn ObjectStore>,
    layout: ArtifactLayout,
    standalone_branches: Vec<String>,
}

impl CassetteStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        layout: ArtifactLayout,
        standalone_branches: Vec<String>,
    ) -> Self {
        Self {
            store,
            layout,
            standalone_branches,
        }
    }

    /// Store sources for `lineage`, lowest priority first.
    pub fn sources(&self, lineage: &BranchLineage) -> Vec<String> {
        let mut sources = Vec::new();
        if !self.standalone_branches.contains(&lineage.base) {
            sources.push(self.layout.main_cassettes());
        }
        if lineage.base != MAIN_BRANCH {
            sources.push(self.layout.branch_cassettes(&lineage.base));
        }
        sources.push(self.layout.branch_cassettes(&lineage.pr));
        sources
    }

    /// Layer every source into `local_dir`. Missing sources are expected
    /// (a new PR has no cassettes yet) and only logged.
    pub async fn fetch(
        &self,
        lineage: &BranchLineage,
        local_dir: &Path,
    ) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|source| StoreError::Io {
                path: local_dir.to_path_buf(),
                source,
            })?;
        let dst = dir_destination(local_dir);

        for src in self.sources(lineage) {
            match self.store.copy(&src, &dst, CopyOptions::default()).await {
                Ok(()) => info!("Fetched cassettes from {}", src),
                Err(e) => warn!("Skipping cassette source {}: {}", src, e),
            }
        }
        Ok(local_dir.to_path_buf())
    }

    /// Push the contents of `local_dir` to `branch`'s overlay. Returns the
    /// number of files published; an empty directory publishes nothing.
    pub async fn publish(&self, local_dir: &Path, branch: &str) -> Result<usize, StoreError> {
        let count = count_files(local_dir);
        if count == 0 {
            info!("No cassettes to publish for {}", branch);
            return Ok(0);
        }
        let src = format!("{}/*", local_dir.display());
        let dst = self.layout.branch_cassette_dir(branch);
        self.store.copy(&src, &dst, CopyOptions::default()).await?;
        info!("Published {} cassette(s) to {}", count, dst);
        Ok(count)
    }
}

fn dir_destination(dir: &Path) -> String {
    let mut dst = dir.display().to_string();
    if !dst.ends_with('/') {
        dst.push('/');
    }
    dst
}

fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Content digests of every cassette in a directory, keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CassetteSnapshot {
    digests: BTreeMap<PathBuf, String>,
}

impl CassetteSnapshot {
    /// Hash every file under `dir`. A missing directory is an empty snapshot.
    pub fn capture(dir: &Path) -> std::io::Result<Self> {
        let mut digests = BTreeMap::new();
        if !dir.exists() {
            return Ok(Self { digests });
        }
        for entry in WalkDir::new(dir).into_iter() {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            let rel = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            digests.insert(rel, format!("{:x}", Sha256::digest(&bytes)));
        }
        Ok(Self { digests })
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Files that are new or changed in `self` relative to `before`.
    pub fn touched_since(&self, before: &CassetteSnapshot) -> Vec<PathBuf> {
        self.digests
            .iter()
            .filter(|(path, digest)| before.digests.get(*path) != Some(*digest))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

/// Copy `files` (relative to `from`) into `to`, preserving relative paths.
pub fn stage_files(from: &Path, files: &[PathBuf], to: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(to)?;
    for rel in files {
        let target = to.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from.join(rel), target)?;
    }
    Ok(files.len())
}
