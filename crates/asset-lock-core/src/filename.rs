use std::path::{Component, Path, PathBuf};

use crate::error::LockError;

/// Wildcard markers a host may pass instead of concrete file names.
const WILDCARDS: [&str; 3] = ["...", "*", "?"];

/// Extensions managed by default (Unreal packages and maps).
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["uasset", "umap"];

/// Which file names may be locked.
///
/// A file is valid when it carries one of the allowed extensions and contains
/// no wildcard marker. Extensions are compared without the dot, ignoring ASCII case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePolicy {
    extensions: Vec<String>,
}

impl Default for FilenamePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

impl FilenamePolicy {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether the extension alone is managed.
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    /// Check a single file name.
    pub fn check(&self, path: &Path) -> Result<(), LockError> {
        let name = path.to_string_lossy();
        if WILDCARDS.iter().any(|w| name.contains(w)) {
            return Err(LockError::Validation(format!(
                "Filename '{}' with wildcards is not supported",
                name
            )));
        }

        if !self.is_supported(path) {
            return Err(LockError::Validation(format!(
                "File '{}' is not a supported asset type",
                name
            )));
        }

        Ok(())
    }

    /// Check a batch; the batch is valid only if every file is.
    ///
    /// Returns every violation, not just the first one.
    pub fn check_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<(), Vec<LockError>> {
        let errors: Vec<LockError> = paths
            .iter()
            .filter_map(|p| self.check(p.as_ref()).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `path` made absolute against the current directory, without touching the
/// file system. Left unchanged when it cannot be resolved.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Repository-relative, `/`-separated path of `local` under `repo_root`.
///
/// Returns `None` when `local` does not live under `repo_root`.
pub fn git_path(local: &Path, repo_root: &Path) -> Option<String> {
    let relative = local.strip_prefix(repo_root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
