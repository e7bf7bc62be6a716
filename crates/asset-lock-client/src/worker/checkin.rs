use asset_lock_core::{LockError, LockInfo};

use super::CommandContext;
use crate::cache::StateCache;
use crate::command::CommandLog;

/// Releases the locks on the given files.
#[derive(Debug, Default)]
pub struct ReleaseLockWorker {
    released: Vec<LockInfo>,
}

impl ReleaseLockWorker {
    pub async fn execute(
        &mut self,
        ctx: &CommandContext,
        log: &mut CommandLog,
    ) -> Result<(), LockError> {
        if ctx.files.is_empty() {
            return Ok(());
        }
        let scope = ctx.scope().await?;
        ctx.lock_service.unlock_files(&scope, &ctx.git_paths).await?;

        self.released = ctx.files.iter().map(LockInfo::unlocked).collect();
        log.info(format!("Unlocked {} file(s)", self.released.len()));
        Ok(())
    }

    pub fn update_states(&self, cache: &mut StateCache) -> bool {
        cache.apply_lock_info(&self.released, "")
    }
}

/// Releases every lock the local user holds on the branch.
#[derive(Debug, Default)]
pub struct ReleaseAllWorker {
    user: String,
}

impl ReleaseAllWorker {
    pub async fn execute(
        &mut self,
        ctx: &CommandContext,
        log: &mut CommandLog,
    ) -> Result<(), LockError> {
        let scope = ctx.scope().await?;
        ctx.lock_service.unlock_all(&scope).await?;

        log.info(format!("Released all locks of {} on {}", scope.user, scope.branch));
        self.user = scope.user;
        Ok(())
    }

    pub fn update_states(&self, cache: &mut StateCache) -> bool {
        cache.release_all_owned_locks(&self.user)
    }
}
