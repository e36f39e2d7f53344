//! Durable object store access and artifact path layout.
//!
//! Locations are plain strings: `gs://bucket/key` for the store, anything
//! else for the local filesystem. A source may end in `*` to copy every
//! object under a prefix; a destination ending in `/` is a directory.

use crate::config::VcrConfig;
use crate::errors::StoreError;
use crate::process::{Invocation, ProcessRunner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const STORE_SCHEME: &str = "gs://";

/// Options for a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Content type stamped on uploaded objects
    pub content_type: Option<&'static str>,
}

impl CopyOptions {
    pub fn text() -> Self {
        Self {
            content_type: Some("text/plain"),
        }
    }
}

/// Path-addressed durable storage supporting pattern copy.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn copy(&self, src: &str, dst: &str, options: CopyOptions) -> Result<(), StoreError>;
}

/// `ObjectStore` that shells out to `gsutil`.
pub struct GsutilStore {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl GsutilStore {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for GsutilStore {
    async fn copy(&self, src: &str, dst: &str, options: CopyOptions) -> Result<(), StoreError> {
        let mut invocation = Invocation::new(&self.program);
        if let Some(content_type) = options.content_type {
            invocation = invocation.args(["-h", &format!("Content-Type:{}", content_type)]);
        }
        if src.contains('*') {
            invocation = invocation.arg("-m");
        }
        invocation = invocation.args(["-q", "cp", src, dst]);

        self.runner
            .run(&invocation)
            .await
            .map(|_| ())
            .map_err(|source| StoreError::Copy {
                src: src.to_string(),
                dst: dst.to_string(),
                source,
            })
    }
}

/// `ObjectStore` over a local directory; `gs://bucket/key` maps to
/// `<root>/bucket/key`. Used for dry runs and tests.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        match location.strip_prefix(STORE_SCHEME) {
            Some(key) => self.root.join(key),
            None => PathBuf::from(location),
        }
    }
}

async fn copy_file(src: &Path, dst: &Path) -> Result<(), StoreError> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::copy(src, dst)
        .await
        .map(|_| ())
        .map_err(|source| StoreError::Io {
            path: src.to_path_buf(),
            source,
        })
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn copy(&self, src: &str, dst: &str, _options: CopyOptions) -> Result<(), StoreError> {
        let pattern = self.resolve(src);
        let pattern_str = pattern.to_string_lossy().to_string();
        let sources: Vec<PathBuf> = glob::glob(&pattern_str)
            .map_err(|e| StoreError::Pattern {
                pattern: src.to_string(),
                message: e.to_string(),
            })?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();

        if sources.is_empty() {
            return Err(StoreError::NoMatch {
                pattern: src.to_string(),
            });
        }

        let dst_path = self.resolve(dst);
        let into_dir = dst.ends_with('/') || sources.len() > 1 || dst_path.is_dir();
        for source in &sources {
            let target = match (into_dir, source.file_name()) {
                (true, Some(name)) => dst_path.join(name),
                _ => dst_path.clone(),
            };
            debug!("Copying {} to {}", source.display(), target.display());
            copy_file(source, &target).await?;
        }
        Ok(())
    }
}

/// Object store locations for one run.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    cassette_root: String,
    log_prefix: String,
}

impl ArtifactLayout {
    pub fn new(config: &VcrConfig) -> Self {
        let storage = &config.policy.storage;
        Self {
            cassette_root: format!(
                "{}{}/{}",
                STORE_SCHEME, storage.cassette_bucket, storage.product
            ),
            log_prefix: format!(
                "{}{}/{}/refs/heads/{}/artifacts/{}/",
                STORE_SCHEME,
                storage.log_bucket,
                storage.product,
                config.pr_branch(),
                config.build_id
            ),
        }
    }

    /// Main-branch cassettes.
    pub fn main_cassettes(&self) -> String {
        format!("{}/fixtures/*", self.cassette_root)
    }

    /// Cassette overlay directory for a branch, with a trailing `/`.
    pub fn branch_cassette_dir(&self, branch: &str) -> String {
        format!("{}/refs/branches/{}/fixtures/", self.cassette_root, branch)
    }

    pub fn branch_cassettes(&self, branch: &str) -> String {
        format!("{}*", self.branch_cassette_dir(branch))
    }

    /// Per-build log prefix, with a trailing `/`.
    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    /// Log location for a path relative to the build prefix.
    pub fn log_path(&self, relative: &str) -> String {
        format!("{}{}", self.log_prefix, relative)
    }

    /// Browser URL for an artifact relative to the build prefix.
    pub fn public_url(&self, relative: &str) -> String {
        let key = self.log_path(relative);
        let key = key.strip_prefix(STORE_SCHEME).unwrap_or(&key);
        format!("https://storage.cloud.google.com/{}", key)
    }
}
