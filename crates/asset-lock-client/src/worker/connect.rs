use asset_lock_core::{LockError, LockInfo};
use tracing::info;

use super::CommandContext;
use crate::cache::StateCache;
use crate::command::CommandLog;

/// Logs in and learns which files are already locked on the branch.
#[derive(Debug, Default)]
pub struct ConnectWorker {
    user: String,
    locked: Vec<LockInfo>,
}

impl ConnectWorker {
    pub async fn execute(
        &mut self,
        ctx: &CommandContext,
        log: &mut CommandLog,
    ) -> Result<(), LockError> {
        let scope = ctx.scope().await?;
        let files = ctx.lock_service.login(&scope).await?;
        let repo_root = &ctx.settings.settings.repo_root;

        // Entries without an owner belong to the logged-in user.
        self.locked = files
            .into_iter()
            .map(|file| LockInfo {
                file_path: repo_root.join(&file.git_path),
                owner: Some(file.owner.unwrap_or_else(|| scope.user.clone())),
            })
            .collect();
        self.user = scope.user;

        info!(
            "Connected to {} as {} ({} locked file(s) on {})",
            scope.server_url,
            self.user,
            self.locked.len(),
            scope.branch
        );
        log.info(format!("Connected to {} as {}", scope.server_url, self.user));
        Ok(())
    }

    pub fn update_states(&self, cache: &mut StateCache) -> bool {
        cache.apply_lock_info(&self.locked, &self.user)
    }
}
