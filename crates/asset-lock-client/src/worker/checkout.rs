use std::path::{Path, PathBuf};

use asset_lock_core::{LockError, LockInfo, LockItem};
use tokio::fs;
use tracing::{debug, warn};

use super::CommandContext;
use crate::cache::StateCache;
use crate::command::CommandLog;

/// Acquires exclusive locks, sending each file's last commit hash so the
/// server can refuse a stale local copy.
#[derive(Debug, Default)]
pub struct AcquireLockWorker {
    user: String,
    items: Vec<LockItem>,
}

impl AcquireLockWorker {
    pub async fn execute(
        &mut self,
        ctx: &CommandContext,
        log: &mut CommandLog,
    ) -> Result<(), LockError> {
        if ctx.files.is_empty() {
            return Ok(());
        }
        let scope = ctx.scope().await?;
        let items = ctx.lock_items(&scope.branch).await?;
        ctx.lock_service.lock_files(&scope, &items).await?;

        for item in &items {
            if let Err(e) = make_writable(&item.local_path).await {
                warn!(
                    "Could not clear read-only flag on {}: {}",
                    item.local_path.display(),
                    e
                );
            }
        }

        log.info(format!("Locked {} file(s)", items.len()));
        self.user = scope.user;
        self.items = items;
        Ok(())
    }

    pub fn update_states(&self, cache: &mut StateCache) -> bool {
        let locks: Vec<LockInfo> = self
            .items
            .iter()
            .map(|item| LockInfo::locked_by(&item.local_path, &self.user))
            .collect();
        let files: Vec<PathBuf> = self.items.iter().map(|item| item.local_path.clone()).collect();

        let mut changed = cache.apply_lock_info(&locks, &self.user);
        changed |= cache.apply_modified_files(&files);
        for item in self.items.iter().filter(|item| !item.last_hash.is_empty()) {
            changed |= cache.record_commit_hash(&item.local_path, &item.last_hash);
        }
        changed
    }
}

/// Clear the read-only flag so the locked asset can be saved.
pub(crate) async fn make_writable(path: &Path) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path).await?.permissions();
    if !permissions.readonly() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);

    fs::set_permissions(path, permissions).await?;
    debug!("Cleared read-only flag on {}", path.display());
    Ok(())
}
