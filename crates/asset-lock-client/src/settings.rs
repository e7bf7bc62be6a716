//! Persisted provider settings.
//!
//! Settings are published through a `tokio::sync::watch` channel as
//! immutable, versioned snapshots. A command captures one snapshot when it
//! is built and never observes later edits.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asset_lock_core::{absolute_path, LockError, LockScope, RepoContext, VersionControl};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::git::{find_git_binary, find_repo_root};

/// Default lock server address.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:15111";

/// User-editable provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Base URL of the lock server
    pub server_url: String,
    /// Name the lock server knows the local user by
    pub user_name: String,
    /// Path of the git executable
    pub binary_path: PathBuf,
    /// Root of the working copy
    pub repo_root: PathBuf,
}

impl Settings {
    pub fn repo_context(&self) -> RepoContext {
        RepoContext::new(&self.binary_path, &self.repo_root)
    }

    /// Request scope for `branch`; fails when the server or user is not configured.
    pub fn lock_scope(&self, branch: impl Into<String>) -> Result<LockScope, LockError> {
        if self.server_url.is_empty() {
            return Err(LockError::Settings("lock server URL is not configured".to_string()));
        }
        if self.user_name.is_empty() {
            return Err(LockError::Settings("user name is not configured".to_string()));
        }
        Ok(LockScope {
            server_url: self.server_url.clone(),
            user: self.user_name.clone(),
            branch: branch.into(),
        })
    }
}

/// Settings as seen by one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// Incremented on every published change
    pub version: u64,
    pub settings: Settings,
}

/// Owner of the current settings and their on-disk copy.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<Arc<SettingsSnapshot>>,
}

impl SettingsStore {
    /// Create a store with `settings` that persists to `path`.
    ///
    /// A relative repository root is resolved against the current directory,
    /// here and on every update.
    pub fn new(path: impl Into<PathBuf>, mut settings: Settings) -> Self {
        settings.repo_root = absolute_path(&settings.repo_root);
        let (tx, _rx) = watch::channel(Arc::new(SettingsSnapshot {
            version: 0,
            settings,
        }));
        Self {
            path: path.into(),
            tx,
        }
    }

    /// `<config dir>/asset-lock/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("asset-lock")
            .join("settings.json")
    }

    /// Load settings from `path`. A missing file yields default settings.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                LockError::Settings(format!("Failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => {
                return Err(LockError::Settings(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(Self::new(path, settings))
    }

    /// Write the current settings, atomically via a temp file.
    pub fn save(&self) -> Result<(), LockError> {
        let snapshot = self.snapshot();
        let json = serde_json::to_string_pretty(&snapshot.settings)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::Settings(format!(
                    "Failed to create settings directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| {
            LockError::Settings(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            LockError::Settings(format!(
                "Failed to rename temp file to {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Saved settings version {} to {}", snapshot.version, self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<SettingsSnapshot> {
        self.tx.borrow().clone()
    }

    /// Receive every published snapshot. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SettingsSnapshot>> {
        self.tx.subscribe()
    }

    /// Apply `edit` and publish a new snapshot if anything changed.
    ///
    /// Returns whether a new version was published.
    pub fn update(&self, edit: impl FnOnce(&mut Settings)) -> bool {
        self.tx.send_if_modified(|current| {
            let mut settings = current.settings.clone();
            edit(&mut settings);
            settings.repo_root = absolute_path(&settings.repo_root);
            if settings == current.settings {
                return false;
            }
            *current = Arc::new(SettingsSnapshot {
                version: current.version + 1,
                settings,
            });
            true
        })
    }

    pub fn set_server_url(&self, url: impl Into<String>) -> bool {
        let url = url.into();
        self.update(|s| s.server_url = url)
    }

    pub fn set_user_name(&self, user: impl Into<String>) -> bool {
        let user = user.into();
        self.update(|s| s.user_name = user)
    }

    pub fn set_binary_path(&self, binary: impl Into<PathBuf>) -> bool {
        let binary = binary.into();
        self.update(|s| s.binary_path = binary)
    }

    pub fn set_repo_root(&self, root: impl Into<PathBuf>) -> bool {
        let root = root.into();
        self.update(|s| s.repo_root = root)
    }

    /// Fill every empty field with a discovered default.
    ///
    /// The repository root is found by walking up from `project_dir`; the
    /// user name is asked from the working copy. Discovery failures leave
    /// the field empty.
    pub async fn init_defaults(&self, project_dir: &Path, vcs: &dyn VersionControl) -> bool {
        let current = self.snapshot().settings.clone();
        let mut settings = current.clone();

        if settings.binary_path.as_os_str().is_empty() {
            settings.binary_path = find_git_binary().unwrap_or_else(|| PathBuf::from("git"));
        }
        if settings.repo_root.as_os_str().is_empty() {
            match find_repo_root(project_dir) {
                Some(root) => settings.repo_root = root,
                None => warn!("No repository found above {}", project_dir.display()),
            }
        }
        if settings.server_url.is_empty() {
            settings.server_url = DEFAULT_SERVER_URL.to_string();
        }
        if settings.user_name.is_empty() && !settings.repo_root.as_os_str().is_empty() {
            match vcs.user_name(&settings.repo_context()).await {
                Ok(user) => settings.user_name = user,
                Err(e) => warn!("Could not read user name: {}", e),
            }
        }

        if settings == current {
            return false;
        }
        info!(
            "Initialized settings: server {}, user '{}', repository {}",
            settings.server_url,
            settings.user_name,
            settings.repo_root.display()
        );
        self.update(|s| *s = settings)
    }
}
