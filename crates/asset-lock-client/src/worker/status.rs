use std::collections::HashSet;
use std::path::PathBuf;

use asset_lock_core::{LockError, LockInfo};
use tracing::debug;

use super::CommandContext;
use crate::cache::StateCache;
use crate::command::CommandLog;

/// Refreshes lock owners and spots files not yet tracked by the working copy.
#[derive(Debug, Default)]
pub struct RefreshStatusWorker {
    user: String,
    lock_infos: Vec<LockInfo>,
    added: Vec<PathBuf>,
}

impl RefreshStatusWorker {
    pub async fn execute(
        &mut self,
        ctx: &CommandContext,
        log: &mut CommandLog,
    ) -> Result<(), LockError> {
        if ctx.files.is_empty() {
            return Ok(());
        }

        let scope = ctx.scope().await?;
        let owners = ctx.lock_service.lock_states(&scope, &ctx.git_paths).await?;
        if owners.len() != ctx.git_paths.len() {
            return Err(LockError::Protocol(format!(
                "Invalid number of lock states: expected {}, got {}",
                ctx.git_paths.len(),
                owners.len()
            )));
        }

        let tracked: HashSet<String> = ctx
            .vcs
            .tracked_files(&ctx.repo(), &ctx.git_paths)
            .await?
            .into_iter()
            .collect();

        let lock_infos = ctx
            .files
            .iter()
            .zip(owners)
            .map(|(file, owner)| LockInfo {
                file_path: file.clone(),
                owner,
            })
            .collect();
        let added: Vec<PathBuf> = ctx
            .files
            .iter()
            .zip(&ctx.git_paths)
            .filter(|(_, git_path)| !tracked.contains(git_path.as_str()))
            .map(|(file, _)| file.clone())
            .collect();

        debug!(
            "Refreshed {} file(s), {} not tracked",
            ctx.files.len(),
            added.len()
        );
        log.info(format!("Updated status of {} file(s)", ctx.files.len()));

        self.user = scope.user;
        self.lock_infos = lock_infos;
        self.added = added;
        Ok(())
    }

    pub fn update_states(&self, cache: &mut StateCache) -> bool {
        let locks_changed = cache.apply_lock_info(&self.lock_infos, &self.user);
        let added_changed = cache.apply_added_files(&self.added);
        locks_changed || added_changed
    }
}
