use std::collections::HashMap;
use std::path::{Path, PathBuf};

use asset_lock_core::{
    absolute_path, git_path, FileState, FilenamePolicy, LockError, LockInfo, LockItem, LockState,
    WorkingCopyState,
};
use tracing::debug;

/// Per-file lock and working-copy state, keyed by absolute path.
///
/// Owned by the dispatcher and only mutated on the thread that ticks it.
/// Every mutator is idempotent and reports whether anything changed.
#[derive(Debug, Default)]
pub struct StateCache {
    states: HashMap<PathBuf, FileState>,
    policy: FilenamePolicy,
    repo_root: PathBuf,
}

impl StateCache {
    pub fn new(policy: FilenamePolicy, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            states: HashMap::new(),
            policy,
            repo_root: absolute_path(&repo_root.into()),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Change the root used to derive git paths of newly created entries.
    pub fn set_repo_root(&mut self, root: impl Into<PathBuf>) {
        let root = absolute_path(&root.into());
        if root != self.repo_root {
            debug!("State cache repository root: {}", root.display());
            self.repo_root = root;
        }
    }

    /// Repository-relative path of `local`, which must be absolute.
    pub fn git_path_of(&self, local: &Path) -> Result<String, LockError> {
        if self.repo_root.as_os_str().is_empty() {
            return Err(LockError::Settings(
                "repository root is not configured".to_string(),
            ));
        }
        git_path(local, &self.repo_root).ok_or_else(|| {
            LockError::Validation(format!(
                "File '{}' is outside the repository {}",
                local.display(),
                self.repo_root.display()
            ))
        })
    }

    pub fn get(&self, path: &Path) -> Option<&FileState> {
        self.states.get(path)
    }

    /// Existing state of `path`, or a fresh one.
    pub fn get_or_create(&mut self, path: &Path) -> &FileState {
        self.entry(path)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileState> {
        self.states.values()
    }

    fn entry(&mut self, path: &Path) -> &mut FileState {
        let policy = &self.policy;
        let repo_root = &self.repo_root;
        self.states.entry(path.to_path_buf()).or_insert_with(|| {
            let relative = (!repo_root.as_os_str().is_empty())
                .then(|| git_path(path, repo_root))
                .flatten();
            match relative {
                Some(git_path) if policy.is_supported(path) => FileState::new(path, git_path),
                _ => FileState::not_controlled(path),
            }
        })
    }

    /// Apply server-reported lock owners.
    ///
    /// An owner equal to `local_user` means locked by us; an empty or
    /// missing owner means unlocked.
    pub fn apply_lock_info(&mut self, infos: &[LockInfo], local_user: &str) -> bool {
        let mut changed = false;
        for info in infos {
            let (lock, owner) = match info.owner.as_deref() {
                None | Some("") => (LockState::NotLocked, None),
                Some(owner) if owner == local_user => (LockState::Locked, Some(owner.to_string())),
                Some(owner) => (LockState::LockedOther, Some(owner.to_string())),
            };
            let state = self.entry(&info.file_path);
            if state.lock != lock || state.lock_owner != owner {
                state.lock = lock;
                state.lock_owner = owner;
                changed = true;
            }
        }
        changed
    }

    fn set_working_copy(&mut self, files: &[PathBuf], working_copy: WorkingCopyState) -> bool {
        let mut changed = false;
        for file in files {
            let state = self.entry(file);
            if state.working_copy != working_copy {
                state.working_copy = working_copy;
                changed = true;
            }
        }
        changed
    }

    pub fn apply_added_files(&mut self, files: &[PathBuf]) -> bool {
        self.set_working_copy(files, WorkingCopyState::Added)
    }

    pub fn apply_modified_files(&mut self, files: &[PathBuf]) -> bool {
        self.set_working_copy(files, WorkingCopyState::Modified)
    }

    /// Mark files deleted; a deleted file holds no lock.
    pub fn apply_deleted_files(&mut self, files: &[PathBuf]) -> bool {
        let mut changed = self.set_working_copy(files, WorkingCopyState::Deleted);
        let released: Vec<LockInfo> = files.iter().map(LockInfo::unlocked).collect();
        changed |= self.apply_lock_info(&released, "");
        changed
    }

    /// Release every lock held by `user`.
    pub fn release_all_owned_locks(&mut self, user: &str) -> bool {
        let mut changed = false;
        for state in self.states.values_mut() {
            if state.lock == LockState::Locked && state.lock_owner.as_deref() == Some(user) {
                state.lock = LockState::NotLocked;
                state.lock_owner = None;
                changed = true;
            }
        }
        changed
    }

    /// Remember the commit hash a lock request was made against.
    pub fn record_commit_hash(&mut self, path: &Path, hash: &str) -> bool {
        let state = self.entry(path);
        if state.last_commit_hash.as_deref() == Some(hash) {
            return false;
        }
        state.last_commit_hash = Some(hash.to_string());
        true
    }

    /// Lock items for every file whose lock is owned by `user`, sorted by path.
    pub fn locked_by(&self, user: &str) -> Vec<LockItem> {
        let mut items: Vec<LockItem> = self
            .states
            .values()
            .filter(|state| {
                matches!(state.lock, LockState::Locked | LockState::LockedOther)
                    && state.lock_owner.as_deref() == Some(user)
            })
            .map(|state| LockItem {
                local_path: state.local_path.clone(),
                git_path: state.git_path.clone(),
                last_hash: state.last_commit_hash.clone().unwrap_or_default(),
            })
            .collect();
        items.sort_by(|a, b| a.local_path.cmp(&b.local_path));
        items
    }
}
