//! Git command runner.
//!
//! The lock layer never changes the working copy through git; it only asks
//! a handful of questions (branch, last commit hash, user name, tracked
//! files). Every call spawns the configured git binary in the repository root.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Output;

use asset_lock_core::{LockError, RepoContext, VersionControl};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Captured output of a successful git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output, trimmed
    pub stdout: String,
    /// Standard error, trimmed
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    pub fn lines(&self) -> Vec<&str> {
        if self.stdout.is_empty() {
            Vec::new()
        } else {
            self.stdout.lines().collect()
        }
    }
}

/// Run git with `args` inside `repo.root`.
///
/// A non-zero exit status becomes [`LockError::Vcs`] carrying stderr
/// (or stdout when stderr is empty).
pub async fn run_git(repo: &RepoContext, args: &[&str]) -> Result<GitOutput, LockError> {
    let output = Command::new(&repo.binary)
        .current_dir(&repo.root)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            LockError::Vcs(format!(
                "failed to execute {} {}: {}",
                repo.binary.display(),
                args.first().unwrap_or(&""),
                e
            ))
        })?;

    let git_output = GitOutput::from_output(&output);

    if output.status.success() {
        Ok(git_output)
    } else {
        let exit_code = output.status.code().unwrap_or(-1);
        let error_msg = if git_output.stderr.is_empty() {
            git_output.stdout
        } else {
            git_output.stderr
        };
        Err(LockError::Vcs(format!(
            "git {} failed (exit code {}): {}",
            args.first().unwrap_or(&""),
            exit_code,
            error_msg
        )))
    }
}

/// [`VersionControl`] backed by the git command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

#[async_trait]
impl VersionControl for GitCli {
    #[instrument(skip(self), level = "debug")]
    async fn branch_name(&self, repo: &RepoContext) -> Result<String, LockError> {
        let output = run_git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(output.stdout)
    }

    #[instrument(skip(self), level = "debug")]
    async fn last_commit_hash(
        &self,
        repo: &RepoContext,
        branch: &str,
        file: &Path,
    ) -> Result<String, LockError> {
        let file = file.to_string_lossy();
        let output = run_git(
            repo,
            &["log", branch, "-n", "1", "--pretty=format:%H", "--", &file],
        )
        .await?;
        debug!("last commit of {} on {}: {}", file, branch, output.stdout);
        Ok(output.stdout)
    }

    #[instrument(skip(self), level = "debug")]
    async fn user_name(&self, repo: &RepoContext) -> Result<String, LockError> {
        let output = run_git(repo, &["config", "user.name"]).await?;
        Ok(output.stdout)
    }

    #[instrument(skip(self, git_paths), level = "debug", fields(files = git_paths.len()))]
    async fn tracked_files(
        &self,
        repo: &RepoContext,
        git_paths: &[String],
    ) -> Result<Vec<String>, LockError> {
        // `ls-files` with no pathspec would list the whole repository.
        if git_paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["ls-files", "--"];
        args.extend(git_paths.iter().map(String::as_str));
        let output = run_git(repo, &args).await?;
        Ok(output.lines().into_iter().map(str::to_string).collect())
    }
}

/// Walk up from `start` looking for a `.git` directory or file.
///
/// Returns the first ancestor (inclusive) that contains one.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Locate a `git` executable on `PATH`.
pub fn find_git_binary() -> Option<PathBuf> {
    let exe = if cfg!(windows) { "git.exe" } else { "git" };
    let path = env::var_os("PATH")?;
    let found = env::split_paths(&path)
        .map(|dir| dir.join(exe))
        .find(|candidate| candidate.is_file());
    if found.is_none() {
        warn!("git binary not found on PATH");
    }
    found
}
