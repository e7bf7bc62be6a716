//! In-memory lock server and working copy for tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use asset_lock_core::{
    LockError, LockItem, LockScope, LockService, LockedFile, RepoContext, VersionControl,
};
use async_trait::async_trait;

/// Lock server keeping `git path -> owner` in memory.
#[derive(Debug, Default)]
pub struct FakeLockService {
    locks: Mutex<HashMap<String, String>>,
    logged_in: AtomicBool,
    delay: Duration,
    drop_last_state: bool,
    offline: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeLockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock(self, git_path: &str, owner: &str) -> Self {
        self.locks
            .lock()
            .unwrap()
            .insert(git_path.to_string(), owner.to_string());
        self
    }

    /// Every call sleeps for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer lock-state queries with one entry too few.
    pub fn with_short_lock_states(mut self) -> Self {
        self.drop_last_state = true;
        self
    }

    /// Every call fails as if the server never answered.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn owner_of(&self, git_path: &str) -> Option<String> {
        self.locks.lock().unwrap().get(git_path).cloned()
    }

    /// Endpoint names called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn call(&self, endpoint: &str) -> Result<(), LockError> {
        self.calls.lock().unwrap().push(endpoint.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.offline {
            return Err(LockError::Network(format!(
                "[/{}] No response from server: connection refused",
                endpoint
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LockService for FakeLockService {
    async fn login(&self, scope: &LockScope) -> Result<Vec<LockedFile>, LockError> {
        self.call("unsafeLogin").await?;
        self.logged_in.store(true, Ordering::SeqCst);

        let mut files: Vec<LockedFile> = self
            .locks
            .lock()
            .unwrap()
            .iter()
            .map(|(path, owner)| LockedFile {
                git_path: path.clone(),
                owner: (owner != &scope.user).then(|| owner.clone()),
            })
            .collect();
        files.sort_by(|a, b| a.git_path.cmp(&b.git_path));
        Ok(files)
    }

    async fn lock_states(
        &self,
        _scope: &LockScope,
        git_paths: &[String],
    ) -> Result<Vec<Option<String>>, LockError> {
        self.call("getLockStates").await?;
        let locks = self.locks.lock().unwrap();
        let mut states: Vec<Option<String>> =
            git_paths.iter().map(|path| locks.get(path).cloned()).collect();
        if self.drop_last_state {
            states.pop();
        }
        Ok(states)
    }

    async fn lock_files(&self, scope: &LockScope, items: &[LockItem]) -> Result<(), LockError> {
        self.call("lockFiles").await?;
        let mut locks = self.locks.lock().unwrap();
        for item in items {
            if let Some(owner) = locks.get(&item.git_path) {
                if owner != &scope.user {
                    return Err(LockError::Protocol(format!(
                        "{} is locked by {}",
                        item.git_path, owner
                    )));
                }
            }
        }
        for item in items {
            locks.insert(item.git_path.clone(), scope.user.clone());
        }
        Ok(())
    }

    async fn unlock_files(
        &self,
        scope: &LockScope,
        git_paths: &[String],
    ) -> Result<(), LockError> {
        self.call("unlockFiles").await?;
        let mut locks = self.locks.lock().unwrap();
        for path in git_paths {
            if locks.get(path) == Some(&scope.user) {
                locks.remove(path);
            }
        }
        Ok(())
    }

    async fn unlock_all(&self, scope: &LockScope) -> Result<(), LockError> {
        self.call("unlockAll").await?;
        self.locks
            .lock()
            .unwrap()
            .retain(|_, owner| owner != &scope.user);
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}

/// Working copy where every file is tracked unless listed otherwise.
#[derive(Debug, Default)]
pub struct FakeVcs {
    branch: String,
    user: String,
    untracked: HashSet<String>,
}

impl FakeVcs {
    pub fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.to_string();
        self
    }

    pub fn with_untracked(mut self, git_path: &str) -> Self {
        self.untracked.insert(git_path.to_string());
        self
    }

    /// Hash reported for `git_path`.
    pub fn hash_of(git_path: &str) -> String {
        format!("hash:{}", git_path)
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn branch_name(&self, _repo: &RepoContext) -> Result<String, LockError> {
        Ok(self.branch.clone())
    }

    async fn last_commit_hash(
        &self,
        _repo: &RepoContext,
        _branch: &str,
        file: &Path,
    ) -> Result<String, LockError> {
        Ok(Self::hash_of(&file.to_string_lossy()))
    }

    async fn user_name(&self, _repo: &RepoContext) -> Result<String, LockError> {
        if self.user.is_empty() {
            return Err(LockError::Vcs("user.name is not set".to_string()));
        }
        Ok(self.user.clone())
    }

    async fn tracked_files(
        &self,
        _repo: &RepoContext,
        git_paths: &[String],
    ) -> Result<Vec<String>, LockError> {
        Ok(git_paths
            .iter()
            .filter(|path| !self.untracked.contains(path.as_str()))
            .cloned()
            .collect())
    }
}
