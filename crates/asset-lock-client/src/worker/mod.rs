//! Per-operation units of work.
//!
//! Every command owns a fresh [`Worker`]. `execute` runs on a pool thread
//! (or inline) and may block on the network or the filesystem; it stages its
//! results inside the worker. `update_states` runs later on the dispatching
//! thread and is the only place a worker touches the [`StateCache`].

mod checkin;
mod checkout;
mod connect;
mod delete;
mod status;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use asset_lock_core::{LockError, LockItem, LockScope, LockService, RepoContext, VersionControl};
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::cache::StateCache;
use crate::command::CommandLog;
use crate::settings::SettingsSnapshot;

pub use checkin::{ReleaseAllWorker, ReleaseLockWorker};
pub use checkout::AcquireLockWorker;
pub use connect::ConnectWorker;
pub use delete::DeleteWorker;
pub use status::RefreshStatusWorker;

/// Operations a host can request, by provider name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Connect,
    UpdateStatus,
    CheckOut,
    CheckIn,
    Delete,
    Revert,
    Copy,
    MarkForAdd,
    UnlockAll,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::Connect,
        OperationKind::UpdateStatus,
        OperationKind::CheckOut,
        OperationKind::CheckIn,
        OperationKind::Delete,
        OperationKind::Revert,
        OperationKind::Copy,
        OperationKind::MarkForAdd,
        OperationKind::UnlockAll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Connect => "Connect",
            OperationKind::UpdateStatus => "UpdateStatus",
            OperationKind::CheckOut => "CheckOut",
            OperationKind::CheckIn => "CheckIn",
            OperationKind::Delete => "Delete",
            OperationKind::Revert => "Revert",
            OperationKind::Copy => "Copy",
            OperationKind::MarkForAdd => "MarkForAdd",
            OperationKind::UnlockAll => "UnlockAll",
        }
    }

    /// Fresh worker for this operation.
    pub fn new_worker(self) -> Worker {
        match self {
            OperationKind::Connect => Worker::Connect(ConnectWorker::default()),
            OperationKind::UpdateStatus => Worker::RefreshStatus(RefreshStatusWorker::default()),
            OperationKind::CheckOut => Worker::AcquireLock(AcquireLockWorker::default()),
            OperationKind::CheckIn => Worker::ReleaseLock(ReleaseLockWorker::default()),
            OperationKind::Delete => Worker::Delete(DeleteWorker::default()),
            OperationKind::Revert => Worker::Revert,
            OperationKind::Copy => Worker::Copy,
            OperationKind::MarkForAdd => Worker::MarkForAdd,
            OperationKind::UnlockAll => Worker::ReleaseAll(ReleaseAllWorker::default()),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| LockError::UnsupportedOperation(s.to_string()))
    }
}

/// A unit of work bound to one command.
#[derive(Debug)]
pub enum Worker {
    Connect(ConnectWorker),
    RefreshStatus(RefreshStatusWorker),
    AcquireLock(AcquireLockWorker),
    ReleaseLock(ReleaseLockWorker),
    Delete(DeleteWorker),
    /// Reverting is left to the working copy.
    Revert,
    Copy,
    MarkForAdd,
    ReleaseAll(ReleaseAllWorker),
}

impl Worker {
    pub fn name(&self) -> &'static str {
        match self {
            Worker::Connect(_) => "Connect",
            Worker::RefreshStatus(_) => "UpdateStatus",
            Worker::AcquireLock(_) => "CheckOut",
            Worker::ReleaseLock(_) => "CheckIn",
            Worker::Delete(_) => "Delete",
            Worker::Revert => "Revert",
            Worker::Copy => "Copy",
            Worker::MarkForAdd => "MarkForAdd",
            Worker::ReleaseAll(_) => "UnlockAll",
        }
    }

    /// Run the operation. Failures are recorded in `log`.
    pub async fn execute(&mut self, ctx: &CommandContext, log: &mut CommandLog) -> bool {
        let result = match self {
            Worker::Connect(worker) => worker.execute(ctx, log).await,
            Worker::RefreshStatus(worker) => worker.execute(ctx, log).await,
            Worker::AcquireLock(worker) => worker.execute(ctx, log).await,
            Worker::ReleaseLock(worker) => worker.execute(ctx, log).await,
            Worker::Delete(worker) => worker.execute(ctx, log).await,
            Worker::Revert | Worker::Copy | Worker::MarkForAdd => Ok(()),
            Worker::ReleaseAll(worker) => worker.execute(ctx, log).await,
        };

        match result {
            Ok(()) => true,
            Err(LockError::Network(detail)) => {
                warn!("{} failed: {}", self.name(), detail);
                log.error(LockError::SERVER_NOT_RESPONDING.to_string());
                false
            }
            Err(e) => {
                debug!("{} failed: {}", self.name(), e);
                log.error(e.to_string());
                false
            }
        }
    }

    /// Apply staged results. Only called after a successful `execute`.
    pub fn update_states(&self, cache: &mut StateCache) -> bool {
        match self {
            Worker::Connect(worker) => worker.update_states(cache),
            Worker::RefreshStatus(worker) => worker.update_states(cache),
            Worker::AcquireLock(worker) => worker.update_states(cache),
            Worker::ReleaseLock(worker) => worker.update_states(cache),
            Worker::Delete(worker) => worker.update_states(cache),
            Worker::Revert | Worker::Copy | Worker::MarkForAdd => false,
            Worker::ReleaseAll(worker) => worker.update_states(cache),
        }
    }
}

pub type WorkerFactory = fn() -> Worker;

/// Operation kind to worker factory.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    factories: HashMap<OperationKind, WorkerFactory>,
}

impl WorkerRegistry {
    /// Registry with no operations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every operation.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(OperationKind::Connect, || OperationKind::Connect.new_worker());
        registry.register(OperationKind::UpdateStatus, || {
            OperationKind::UpdateStatus.new_worker()
        });
        registry.register(OperationKind::CheckOut, || OperationKind::CheckOut.new_worker());
        registry.register(OperationKind::CheckIn, || OperationKind::CheckIn.new_worker());
        registry.register(OperationKind::Delete, || OperationKind::Delete.new_worker());
        registry.register(OperationKind::Revert, || OperationKind::Revert.new_worker());
        registry.register(OperationKind::Copy, || OperationKind::Copy.new_worker());
        registry.register(OperationKind::MarkForAdd, || {
            OperationKind::MarkForAdd.new_worker()
        });
        registry.register(OperationKind::UnlockAll, || OperationKind::UnlockAll.new_worker());
        registry
    }

    pub fn register(&mut self, kind: OperationKind, factory: WorkerFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn is_registered(&self, kind: OperationKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Fresh worker for the operation called `name`, if one is registered.
    pub fn create(&self, name: &str) -> Option<Worker> {
        let kind = name.parse::<OperationKind>().ok()?;
        self.factories.get(&kind).map(|factory| factory())
    }
}

/// Everything a worker may use while executing.
///
/// Built on the dispatching thread when the command is created; the
/// settings snapshot is never refreshed afterwards.
#[derive(Clone)]
pub struct CommandContext {
    pub settings: Arc<SettingsSnapshot>,
    pub lock_service: Arc<dyn LockService>,
    pub vcs: Arc<dyn VersionControl>,
    /// Absolute paths
    pub files: Vec<PathBuf>,
    /// Repository-relative paths, parallel to `files`
    pub git_paths: Vec<String>,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("settings_version", &self.settings.version)
            .field("files", &self.files)
            .finish()
    }
}

impl CommandContext {
    pub fn user(&self) -> &str {
        &self.settings.settings.user_name
    }

    pub fn repo(&self) -> RepoContext {
        self.settings.settings.repo_context()
    }

    /// Scope of lock requests: configured user on the current branch.
    pub async fn scope(&self) -> Result<LockScope, LockError> {
        let branch = self.vcs.branch_name(&self.repo()).await?;
        self.settings.settings.lock_scope(branch)
    }

    /// Lock items for every file, each carrying its last commit hash on `branch`.
    pub async fn lock_items(&self, branch: &str) -> Result<Vec<LockItem>, LockError> {
        let repo = self.repo();
        let hashes = try_join_all(
            self.git_paths
                .iter()
                .map(|git_path| self.vcs.last_commit_hash(&repo, branch, Path::new(git_path))),
        )
        .await?;

        Ok(self
            .files
            .iter()
            .zip(&self.git_paths)
            .zip(hashes)
            .map(|((local_path, git_path), last_hash)| LockItem {
                local_path: local_path.clone(),
                git_path: git_path.clone(),
                last_hash,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.name().parse::<OperationKind>().unwrap(), kind);
            assert_eq!(kind.new_worker().name(), kind.name());
        }
        assert!(matches!(
            "Sync".parse::<OperationKind>(),
            Err(LockError::UnsupportedOperation(name)) if name == "Sync"
        ));
    }

    #[test]
    fn test_registry_creates_fresh_workers() {
        let registry = WorkerRegistry::with_defaults();
        for kind in OperationKind::ALL {
            assert!(registry.is_registered(kind));
        }
        assert!(matches!(registry.create("CheckOut"), Some(Worker::AcquireLock(_))));
        assert!(registry.create("Resolve").is_none());

        let mut partial = WorkerRegistry::new();
        partial.register(OperationKind::Connect, || OperationKind::Connect.new_worker());
        assert!(partial.create("Connect").is_some());
        assert!(partial.create("CheckOut").is_none());
    }
}
