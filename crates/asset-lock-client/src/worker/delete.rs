use std::path::PathBuf;

use asset_lock_core::{LockError, LockInfo};
use tokio::fs;
use tracing::{info, warn};

use super::CommandContext;
use crate::cache::StateCache;
use crate::command::CommandLog;

/// Locks files, then removes them from disk.
///
/// A file that cannot be removed is reported but does not fail the batch;
/// it keeps its lock and its working-copy state.
#[derive(Debug, Default)]
pub struct DeleteWorker {
    user: String,
    removed: Vec<PathBuf>,
    kept: Vec<PathBuf>,
}

impl DeleteWorker {
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

        for item in items {
            match fs::remove_file(&item.local_path).await {
                Ok(()) => {
                    info!("Deleted {}", item.local_path.display());
                    self.removed.push(item.local_path);
                }
                Err(e) => {
                    let err = LockError::Io(format!(
                        "Failed to delete {}: {}",
                        item.local_path.display(),
                        e
                    ));
                    warn!("{}", err);
                    log.error(err.to_string());
                    self.kept.push(item.local_path);
                }
            }
        }

        log.info(format!("Deleted {} file(s)", self.removed.len()));
        self.user = scope.user;
        Ok(())
    }

    pub fn update_states(&self, cache: &mut StateCache) -> bool {
        let still_locked: Vec<LockInfo> = self
            .kept
            .iter()
            .map(|file| LockInfo::locked_by(file, &self.user))
            .collect();

        let mut changed = cache.apply_lock_info(&still_locked, &self.user);
        changed |= cache.apply_deleted_files(&self.removed);
        changed
    }
}
