mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use asset_lock_client::{
    CommandOutcome, CommandRequest, Dispatcher, GitCli, HttpLockClient, OperationKind,
    SettingsStore, StateCacheUsage,
};
use asset_lock_core::{absolute_path, FileState, LockItem, VersionControl};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{CliCommand, Config, SettingsAction};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    let settings_file = config.effective_settings_file();
    info!("Settings file: {}", settings_file.display());
    if let CliCommand::Settings { action } = &config.command {
        return run_settings(&settings_file, action);
    }

    let store = SettingsStore::load(&settings_file)
        .with_context(|| format!("Failed to load settings from {}", settings_file.display()))?;

    // The pool that runs commands; the main thread only dispatches and ticks.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.max(1))
        .thread_name("asset-lock-worker")
        .enable_all()
        .build()
        .context("Failed to start worker pool")?;

    let vcs: Arc<dyn VersionControl> = Arc::new(GitCli);
    let project_dir = std::env::current_dir().context("Failed to read current directory")?;
    config.apply_overrides(&store);
    runtime.block_on(store.init_defaults(&project_dir, vcs.as_ref()));

    {
        let snapshot = store.snapshot();
        info!("  Server: {}", snapshot.settings.server_url);
        info!("  User: {}", snapshot.settings.user_name);
        info!("  Repository: {}", snapshot.settings.repo_root.display());
    }

    let lock_service = Arc::new(HttpLockClient::new(config.request_timeout())?);
    let mut dispatcher = Dispatcher::new(
        store,
        lock_service,
        vcs,
        Some(runtime.handle().clone()),
        config.dispatcher_options(),
    );

    run(&mut dispatcher, &config.command)
}

fn run(dispatcher: &mut Dispatcher, command: &CliCommand) -> anyhow::Result<()> {
    match command {
        CliCommand::Connect => {
            let outcome = execute(dispatcher, OperationKind::Connect, &[])?;
            print_messages(&outcome);
            print_states(&dispatcher.cache().iter().cloned().collect::<Vec<_>>());
        }
        CliCommand::Status { files } => {
            print_states(&dispatcher.get_state(files.as_slice(), StateCacheUsage::ForceUpdate));
        }
        CliCommand::Lock { files } => {
            execute(dispatcher, OperationKind::CheckOut, files)?;
            print_states(&dispatcher.get_state(files.as_slice(), StateCacheUsage::Use));
        }
        CliCommand::Unlock { files } => {
            execute(dispatcher, OperationKind::CheckIn, files)?;
            print_states(&dispatcher.get_state(files.as_slice(), StateCacheUsage::Use));
        }
        CliCommand::Delete { files } => {
            let outcome = execute(dispatcher, OperationKind::Delete, files)?;
            print_messages(&outcome);
            print_states(&dispatcher.get_state(files.as_slice(), StateCacheUsage::Use));
        }
        CliCommand::UnlockAll => {
            let outcome = execute(dispatcher, OperationKind::UnlockAll, &[])?;
            print_messages(&outcome);
        }
        CliCommand::Locks { release, files } => {
            execute(dispatcher, OperationKind::Connect, &[])?;
            let items = select_items(dispatcher.my_locked_items(), files);
            if items.is_empty() {
                println!("No locks held.");
                return Ok(());
            }
            for item in &items {
                println!("{}", item.git_path);
            }
            if *release {
                let outcome = dispatcher.release_selected(&items);
                check(&outcome)?;
                println!("Released {} lock(s).", items.len());
            }
        }
        CliCommand::Settings { action } => run_settings(dispatcher.settings().path(), action)?,
    }
    Ok(())
}

/// The held locks among `files`, or every held lock when no file is named.
fn select_items(items: Vec<LockItem>, files: &[PathBuf]) -> Vec<LockItem> {
    if files.is_empty() {
        return items;
    }

    let wanted: Vec<PathBuf> = files.iter().map(|f| absolute_path(f)).collect();
    for file in &wanted {
        if !items.iter().any(|item| &item.local_path == file) {
            warn!("No lock held on {}", file.display());
        }
    }
    items
        .into_iter()
        .filter(|item| wanted.contains(&item.local_path))
        .collect()
}

/// Run an operation synchronously, failing on a failed outcome.
fn execute(
    dispatcher: &mut Dispatcher,
    operation: OperationKind,
    files: &[PathBuf],
) -> anyhow::Result<CommandOutcome> {
    let outcome = dispatcher.execute(CommandRequest::new(operation.name(), files.to_vec()));
    check(&outcome)?;
    Ok(outcome)
}

fn check(outcome: &CommandOutcome) -> anyhow::Result<()> {
    if !outcome.succeeded() {
        bail!(
            "{} failed: {}",
            outcome.operation,
            outcome.error_messages.join("; ")
        );
    }
    Ok(())
}

/// Show or change the settings file. Flag and environment overrides do not apply.
fn run_settings(path: &Path, action: &SettingsAction) -> anyhow::Result<()> {
    let store = match action {
        SettingsAction::Show => SettingsStore::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        SettingsAction::Set { key, value } => {
            let store = key
                .persist(path, value)
                .with_context(|| format!("Failed to save {}", path.display()))?;
            info!("Saved settings to {}", path.display());
            store
        }
    };

    let snapshot = store.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot.settings)?);
    Ok(())
}

fn print_messages(outcome: &CommandOutcome) {
    for message in &outcome.info_messages {
        println!("{}", message);
    }
    for message in &outcome.error_messages {
        eprintln!("{}", message);
    }
}

fn print_states(states: &[FileState]) {
    for state in states {
        let owner = state.lock_owner.as_deref().unwrap_or("-");
        println!(
            "{:<60} {:<16} {:<16} {}",
            state.local_path.display().to_string(),
            state.working_copy.to_string(),
            state.lock.to_string(),
            owner
        );
    }
}
