use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LockError;

/// Lock owner of a single file, as staged by a worker for the state cache.
///
/// `owner: None` means the file is not locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub file_path: PathBuf,
    pub owner: Option<String>,
}

impl LockInfo {
    pub fn locked_by(file_path: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            owner: Some(owner.into()),
        }
    }

    pub fn unlocked(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            owner: None,
        }
    }
}

/// Request payload for acquiring or releasing the lock on one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockItem {
    /// Absolute local path
    pub local_path: PathBuf,
    /// Repository-relative path sent to the server
    pub git_path: String,
    /// Last known commit hash, lets the server detect a stale local view
    pub last_hash: String,
}

/// A path the server reports as locked at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedFile {
    pub git_path: String,
    /// Owner when the server reports one
    pub owner: Option<String>,
}

/// Who is asking, and against which server and branch.
///
/// Every protocol request carries `user` and `branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockScope {
    pub server_url: String,
    pub user: String,
    pub branch: String,
}

/// Client side of the remote lock server.
///
/// Implementations must be usable from pool threads; they never touch the
/// state cache. Every method resolves to either a typed payload or a
/// [`LockError::Network`] / [`LockError::Protocol`] failure carrying the
/// server's message.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Log in and fetch the paths currently locked on this branch.
    async fn login(&self, scope: &LockScope) -> Result<Vec<LockedFile>, LockError>;

    /// Query the owner of each file.
    ///
    /// The returned vector has exactly one entry per requested path, in
    /// request order; `None` means unlocked.
    async fn lock_states(
        &self,
        scope: &LockScope,
        git_paths: &[String],
    ) -> Result<Vec<Option<String>>, LockError>;

    /// Lock files, sending each file's last known commit hash.
    async fn lock_files(&self, scope: &LockScope, items: &[LockItem]) -> Result<(), LockError>;

    async fn unlock_files(&self, scope: &LockScope, git_paths: &[String])
        -> Result<(), LockError>;

    /// Release every lock held by `scope.user` on `scope.branch`.
    async fn unlock_all(&self, scope: &LockScope) -> Result<(), LockError>;

    /// Whether a login has succeeded on this client.
    fn is_logged_in(&self) -> bool;
}
