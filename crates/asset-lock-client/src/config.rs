use std::path::{Path, PathBuf};
use std::time::Duration;

use asset_lock_client::{DispatcherOptions, ReapPolicy, SettingsStore};
use asset_lock_core::{FilenamePolicy, LockError, DEFAULT_EXTENSIONS};
use clap::{Parser, Subcommand};

/// Command-line configuration for the asset-lock client.
///
/// Flags and environment variables override the persisted settings for
/// this run only; `settings set` is the way to change them for good. The
/// `settings` subcommands ignore them and work on the file alone.
#[derive(Parser, Debug, Clone)]
#[command(name = "asset-lock")]
#[command(about = "Exclusive locks for binary assets, kept in sync with a lock server")]
pub struct Config {
    /// Settings file (default: <config dir>/asset-lock/settings.json)
    #[arg(long, env = "ASSET_LOCK_SETTINGS")]
    pub settings_file: Option<PathBuf>,

    /// Lock server URL
    #[arg(long, env = "ASSET_LOCK_SERVER_URL")]
    pub server_url: Option<String>,

    /// User name known to the lock server
    #[arg(long, env = "ASSET_LOCK_USER")]
    pub user: Option<String>,

    /// Path of the git executable
    #[arg(long, env = "ASSET_LOCK_GIT")]
    pub git_binary: Option<PathBuf>,

    /// Root of the working copy
    #[arg(long, env = "ASSET_LOCK_REPO_ROOT")]
    pub repo_root: Option<PathBuf>,

    /// HTTP request timeout, in seconds
    #[arg(long, default_value = "30", env = "ASSET_LOCK_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    /// How long a command may run before it is reported as failed, in seconds
    #[arg(long, default_value = "60", env = "ASSET_LOCK_COMMAND_TIMEOUT")]
    pub command_timeout: u64,

    /// Worker threads running commands
    #[arg(long, default_value = "4", env = "ASSET_LOCK_WORKERS")]
    pub workers: usize,

    /// Lockable file extensions
    #[arg(
        long,
        value_delimiter = ',',
        default_values = DEFAULT_EXTENSIONS,
        env = "ASSET_LOCK_EXTENSIONS"
    )]
    pub extensions: Vec<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Log in and fetch the locks held on the current branch
    Connect,
    /// Show the lock status of files
    Status {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Lock files for editing
    Lock {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Release the locks on files
    Unlock {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Lock files, then delete them
    Delete {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Release every lock held on the current branch
    UnlockAll,
    /// List the locks held by the configured user
    Locks {
        /// Release the listed locks
        #[arg(long)]
        release: bool,
        /// Only these files (default: every lock held)
        files: Vec<PathBuf>,
    },
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsAction {
    /// Print the persisted settings
    Show,
    /// Change one setting and save
    Set { key: SettingKey, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SettingKey {
    ServerUrl,
    UserName,
    GitBinary,
    RepoRoot,
}

impl Config {
    /// Get the effective settings file.
    pub fn effective_settings_file(&self) -> PathBuf {
        self.settings_file
            .clone()
            .unwrap_or_else(SettingsStore::default_path)
    }

    /// Overlay flags and environment variables on the loaded settings.
    pub fn apply_overrides(&self, store: &SettingsStore) {
        store.update(|settings| {
            if let Some(url) = &self.server_url {
                settings.server_url = url.clone();
            }
            if let Some(user) = &self.user {
                settings.user_name = user.clone();
            }
            if let Some(binary) = &self.git_binary {
                settings.binary_path = binary.clone();
            }
            if let Some(root) = &self.repo_root {
                settings.repo_root = root.clone();
            }
        });
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            sync_timeout: Duration::from_secs(self.command_timeout),
            reap_policy: ReapPolicy::AllReady,
            filename_policy: FilenamePolicy::new(&self.extensions),
        }
    }
}

impl SettingKey {
    pub fn apply(self, store: &SettingsStore, value: &str) -> bool {
        match self {
            SettingKey::ServerUrl => store.set_server_url(value),
            SettingKey::UserName => store.set_user_name(value),
            SettingKey::GitBinary => store.set_binary_path(value),
            SettingKey::RepoRoot => store.set_repo_root(value),
        }
    }

    /// Change this setting in the file at `path`, leaving every other saved
    /// value as it is on disk.
    pub fn persist(self, path: &Path, value: &str) -> Result<SettingsStore, LockError> {
        let store = SettingsStore::load(path)?;
        if self.apply(&store, value) {
            store.save()?;
        }
        Ok(store)
    }
}
