//! Command dispatch and main-thread reconciliation.
//!
//! The [`Dispatcher`] is the provider surface a host talks to. It validates
//! requests, binds a fresh worker to each command, runs the worker on the
//! pool (or inline when there is none) and, on [`Dispatcher::tick`], applies
//! finished workers to the state cache and fires completion callbacks.
//!
//! Everything that touches the cache or the pending set takes `&mut self`,
//! so only the thread owning the dispatcher ever mutates them. Pool tasks
//! only see their own [`CommandContext`] and completion slot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use asset_lock_core::{
    absolute_path, FileState, FilenamePolicy, LockError, LockItem, LockService, VersionControl,
};
use tokio::runtime::{Builder, Handle};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::StateCache;
use crate::command::{Command, CommandLog, CommandOutcome, CommandRequest, Concurrency, Executed};
use crate::settings::SettingsStore;
use crate::worker::{CommandContext, OperationKind, Worker, WorkerRegistry};

/// Name hosts know this provider by.
pub const PROVIDER_NAME: &str = "asset-lock";

/// Log target of messages produced by commands.
pub const LOG_TARGET: &str = "source_control";

pub const NOT_LOGGED_IN: &str = "You are not logged in!";

/// How many finished commands a single tick reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReapPolicy {
    /// Every command that is ready when the tick starts.
    #[default]
    AllReady,
    /// Only the oldest ready command.
    OnePerTick,
}

/// Whether [`Dispatcher::get_state`] may answer from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateCacheUsage {
    #[default]
    Use,
    /// Refresh from the lock server first.
    ForceUpdate,
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// How long a synchronous command may take before it is reported as failed
    pub sync_timeout: Duration,
    pub reap_policy: ReapPolicy,
    /// Which files may be locked at all
    pub filename_policy: FilenamePolicy,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(30),
            reap_policy: ReapPolicy::default(),
            filename_policy: FilenamePolicy::default(),
        }
    }
}

pub struct Dispatcher {
    registry: WorkerRegistry,
    cache: StateCache,
    settings: SettingsStore,
    lock_service: Arc<dyn LockService>,
    vcs: Arc<dyn VersionControl>,
    pool: Option<Handle>,
    options: DispatcherOptions,
    pending: Vec<Command>,
    changes: watch::Sender<u64>,
}

impl Dispatcher {
    /// Create a dispatcher with every operation registered.
    ///
    /// Commands run on `pool` when given, inline on the calling thread otherwise.
    pub fn new(
        settings: SettingsStore,
        lock_service: Arc<dyn LockService>,
        vcs: Arc<dyn VersionControl>,
        pool: Option<Handle>,
        options: DispatcherOptions,
    ) -> Self {
        let repo_root = settings.snapshot().settings.repo_root.clone();
        let (changes, _rx) = watch::channel(0);
        Self {
            registry: WorkerRegistry::with_defaults(),
            cache: StateCache::new(options.filename_policy.clone(), repo_root),
            settings,
            lock_service,
            vcs,
            pool,
            options,
            pending: Vec::new(),
            changes,
        }
    }

    pub fn with_registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// Commands dispatched but not yet reconciled.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock_service.is_logged_in()
    }

    /// Commands can never be cancelled once issued.
    pub fn can_cancel(&self) -> bool {
        false
    }

    /// Receive a new generation number whenever a tick changed any file state.
    /// Drop the receiver to unsubscribe.
    pub fn subscribe_state_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Run an operation.
    ///
    /// A synchronous request returns its reconciled outcome. An asynchronous
    /// one returns `Succeeded` once queued and reports through its callback
    /// on a later [`tick`](Self::tick).
    pub fn execute(&mut self, request: CommandRequest) -> CommandOutcome {
        let CommandRequest {
            operation,
            files,
            concurrency,
            callback,
        } = request;
        let command = Command::new(operation, callback);

        if let Err(errors) = self.options.filename_policy.check_all(&files) {
            return reject(command, errors.iter().map(ToString::to_string).collect());
        }

        let Some(worker) = self.registry.create(&command.operation) else {
            let message = format!(
                "Operation '{}' not supported by source control provider '{}'",
                command.operation, PROVIDER_NAME
            );
            return reject(command, vec![message]);
        };

        let ctx = match self.context(files) {
            Ok(ctx) => ctx,
            Err(errors) => {
                return reject(command, errors.iter().map(ToString::to_string).collect())
            }
        };
        debug!(
            "Dispatching {} on {} file(s), settings v{}",
            command.operation,
            ctx.files.len(),
            ctx.settings.version
        );

        let Some(pool) = self.pool.clone() else {
            return self.run_inline(worker, ctx, command);
        };

        spawn(&pool, worker, ctx, &command);
        match concurrency {
            Concurrency::Synchronous => self.wait_for(command),
            Concurrency::Asynchronous => {
                let outcome = CommandOutcome::queued(&command.operation);
                self.pending.push(command);
                outcome
            }
        }
    }

    /// Reconcile finished commands: apply their state updates, emit their
    /// messages and fire their callbacks. Returns how many were reconciled.
    ///
    /// Broadcasts at most one state change per call.
    pub fn tick(&mut self) -> usize {
        self.tick_with(false)
    }

    /// Cached state of `files`, optionally refreshed from the server first.
    pub fn get_state<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        usage: StateCacheUsage,
    ) -> Vec<FileState> {
        let files: Vec<PathBuf> = files.iter().map(|f| absolute_path(f.as_ref())).collect();

        if usage == StateCacheUsage::ForceUpdate {
            let request = CommandRequest::new(OperationKind::UpdateStatus.name(), files.clone());
            if !self.execute(request).succeeded() {
                debug!("Forced status update failed, answering from cache");
            }
        }

        self.sync_repo_root();
        files
            .iter()
            .map(|file| self.cache.get_or_create(file).clone())
            .collect()
    }

    /// Files the configured user currently holds locks on.
    pub fn my_locked_items(&self) -> Vec<LockItem> {
        self.cache
            .locked_by(&self.settings.snapshot().settings.user_name)
    }

    /// Release the locks on a chosen subset of [`my_locked_items`](Self::my_locked_items).
    pub fn release_selected(&mut self, items: &[LockItem]) -> CommandOutcome {
        let operation = OperationKind::CheckIn.name();
        if !self.lock_service.is_logged_in() {
            warn!(target: LOG_TARGET, "{}", NOT_LOGGED_IN);
            return CommandOutcome::failed(operation, vec![NOT_LOGGED_IN.to_string()]);
        }
        if items.is_empty() {
            return CommandOutcome::new(operation, true, CommandLog::default());
        }

        info!("Releasing {} selected lock(s)", items.len());
        self.execute(CommandRequest::new(
            operation,
            items.iter().map(|item| item.local_path.clone()),
        ))
    }

    fn sync_repo_root(&mut self) {
        let snapshot = self.settings.snapshot();
        self.cache.set_repo_root(&snapshot.settings.repo_root);
    }

    /// Bind `files` to the current settings. Every file must lie in the repository.
    fn context(&mut self, files: Vec<PathBuf>) -> Result<CommandContext, Vec<LockError>> {
        self.sync_repo_root();
        let files: Vec<PathBuf> = files.iter().map(|f| absolute_path(f)).collect();

        let mut git_paths = Vec::with_capacity(files.len());
        let mut errors = Vec::new();
        for file in &files {
            match self.cache.git_path_of(file) {
                Ok(git_path) => git_paths.push(git_path),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            errors.dedup();
            return Err(errors);
        }

        Ok(CommandContext {
            settings: self.settings.snapshot(),
            lock_service: self.lock_service.clone(),
            vcs: self.vcs.clone(),
            files,
            git_paths,
        })
    }

    /// Execute on the calling thread, then reconcile immediately.
    fn run_inline(
        &mut self,
        mut worker: Worker,
        ctx: CommandContext,
        mut command: Command,
    ) -> CommandOutcome {
        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let err = LockError::Io(format!("Failed to start command runtime: {}", e));
                error!(target: LOG_TARGET, "{}", err);
                let outcome = CommandOutcome::failed(&command.operation, vec![err.to_string()]);
                command.notify(&outcome);
                return outcome;
            }
        };

        let mut log = CommandLog::default();
        let success = runtime.block_on(worker.execute(&ctx, &mut log));
        command.completion.finish(Executed {
            worker,
            success,
            log,
        });

        let (outcome, changed) = self.reconcile(command);
        if changed {
            self.broadcast();
        }
        outcome
    }

    /// Block until a pooled synchronous command finishes or times out.
    fn wait_for(&mut self, mut command: Command) -> CommandOutcome {
        if command.completion.wait(self.options.sync_timeout) {
            let (outcome, changed) = self.reconcile(command);
            self.tick_with(changed);
            return outcome;
        }

        // Still running: report the failure now, keep the command so a later
        // tick applies whatever it eventually stages.
        warn!(
            "{} did not complete within {:?}",
            command.operation, self.options.sync_timeout
        );
        error!(target: LOG_TARGET, "{}", LockError::SERVER_NOT_RESPONDING);
        let outcome = CommandOutcome::failed(
            &command.operation,
            vec![LockError::SERVER_NOT_RESPONDING.to_string()],
        );
        command.notify(&outcome);
        self.pending.push(command);
        self.tick();
        outcome
    }

    fn tick_with(&mut self, mut changed: bool) -> usize {
        let ready = self.take_ready();
        let count = ready.len();
        for command in ready {
            let (_, command_changed) = self.reconcile(command);
            changed |= command_changed;
        }
        if changed {
            self.broadcast();
        }
        count
    }

    /// Remove ready commands from the pending set, oldest first.
    fn take_ready(&mut self) -> Vec<Command> {
        let one_per_tick = self.options.reap_policy == ReapPolicy::OnePerTick;
        let mut ready = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());

        for command in std::mem::take(&mut self.pending) {
            let capped = one_per_tick && !ready.is_empty();
            if !capped && command.completion.is_done() {
                ready.push(command);
            } else {
                remaining.push(command);
            }
        }

        self.pending = remaining;
        ready
    }

    /// Apply a finished command. Returns its outcome and whether any state changed.
    fn reconcile(&mut self, mut command: Command) -> (CommandOutcome, bool) {
        let Some(Executed {
            worker,
            success,
            log,
        }) = command.completion.take()
        else {
            let outcome = CommandOutcome::failed(
                &command.operation,
                vec![format!("{} finished without a result", command.operation)],
            );
            command.notify(&outcome);
            return (outcome, false);
        };

        let changed = success && worker.update_states(&mut self.cache);
        let outcome = CommandOutcome::new(&command.operation, success, log);
        emit_messages(&outcome);
        command.notify(&outcome);
        debug!("Reconciled {} ({})", command.operation, outcome.result);
        (outcome, changed)
    }

    fn broadcast(&self) {
        self.changes.send_modify(|generation| *generation += 1);
        debug!("File states changed (generation {})", *self.changes.borrow());
    }

    #[cfg(test)]
    fn ready_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|command| command.completion.is_done())
            .count()
    }
}

fn spawn(pool: &Handle, mut worker: Worker, ctx: CommandContext, command: &Command) {
    let completion = command.completion.clone();
    pool.spawn(async move {
        let mut log = CommandLog::default();
        let success = worker.execute(&ctx, &mut log).await;
        completion.finish(Executed {
            worker,
            success,
            log,
        });
    });
}

/// Fail a command before dispatch.
fn reject(mut command: Command, errors: Vec<String>) -> CommandOutcome {
    for message in &errors {
        error!(target: LOG_TARGET, "{}", message);
    }
    let outcome = CommandOutcome::failed(&command.operation, errors);
    command.notify(&outcome);
    outcome
}

fn emit_messages(outcome: &CommandOutcome) {
    for message in &outcome.info_messages {
        info!(target: LOG_TARGET, "{}", message);
    }
    for message in &outcome.error_messages {
        error!(target: LOG_TARGET, "{}", message);
    }
}
