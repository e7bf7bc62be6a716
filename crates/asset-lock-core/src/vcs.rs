use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::LockError;

/// Location of the underlying working copy and the binary that drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    pub binary: PathBuf,
    pub root: PathBuf,
}

impl RepoContext {
    pub fn new(binary: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            root: root.into(),
        }
    }
}

/// The underlying version-control working copy.
///
/// Locks only augment an existing working copy; this trait covers the few
/// process-boundary queries the lock layer needs.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Name of the checked-out branch.
    async fn branch_name(&self, repo: &RepoContext) -> Result<String, LockError>;

    /// Hash of the last commit on `branch` touching `file`.
    async fn last_commit_hash(
        &self,
        repo: &RepoContext,
        branch: &str,
        file: &Path,
    ) -> Result<String, LockError>;

    /// Configured user name of the working copy.
    async fn user_name(&self, repo: &RepoContext) -> Result<String, LockError>;

    /// Which of `git_paths` are tracked, as repository-relative paths.
    async fn tracked_files(
        &self,
        repo: &RepoContext,
        git_paths: &[String],
    ) -> Result<Vec<String>, LockError>;
}
