use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Local modification status of a file, independent of lock ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingCopyState {
    #[default]
    Unknown,
    /// Clean / pristine.
    Unchanged,
    Added,
    Deleted,
    Modified,
    Renamed,
    NotControlled,
    Ignored,
}

/// Lock status of a file as last reported by the lock server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unknown,
    NotLocked,
    /// Locked by the local user.
    Locked,
    LockedOther,
    NotCurrent,
}

impl fmt::Display for WorkingCopyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkingCopyState::Unknown => "unknown",
            WorkingCopyState::Unchanged => "unchanged",
            WorkingCopyState::Added => "added",
            WorkingCopyState::Deleted => "deleted",
            WorkingCopyState::Modified => "modified",
            WorkingCopyState::Renamed => "renamed",
            WorkingCopyState::NotControlled => "not controlled",
            WorkingCopyState::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Unknown => "unknown",
            LockState::NotLocked => "not locked",
            LockState::Locked => "locked",
            LockState::LockedOther => "locked by other",
            LockState::NotCurrent => "not current",
        };
        f.write_str(name)
    }
}

/// Cached lock / working-copy state of a single file.
///
/// Keyed by absolute local path. The derived predicates are pure functions of
/// `(working_copy, lock)` and mirror what a source-control host asks a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Absolute local path
    pub local_path: PathBuf,
    /// Path relative to the repository root, `/`-separated
    pub git_path: String,
    pub working_copy: WorkingCopyState,
    pub lock: LockState,
    /// Owner reported by the server, if any
    pub lock_owner: Option<String>,
    /// Last commit hash sent along with a lock request
    pub last_commit_hash: Option<String>,
}

impl FileState {
    /// Create the default state for a newly referenced file.
    pub fn new(local_path: impl Into<PathBuf>, git_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            git_path: git_path.into(),
            working_copy: WorkingCopyState::Unknown,
            lock: LockState::NotLocked,
            lock_owner: None,
            last_commit_hash: None,
        }
    }

    /// Create the state of a file that this provider never manages.
    pub fn not_controlled(local_path: impl Into<PathBuf>) -> Self {
        Self {
            working_copy: WorkingCopyState::NotControlled,
            ..Self::new(local_path, String::new())
        }
    }

    pub fn filename(&self) -> &Path {
        &self.local_path
    }

    pub fn can_check_in(&self) -> bool {
        self.working_copy != WorkingCopyState::Added && self.lock == LockState::Locked
    }

    pub fn can_checkout(&self) -> bool {
        // Newly added files don't care about locking.
        if self.working_copy == WorkingCopyState::Added {
            return false;
        }
        self.lock == LockState::NotLocked
    }

    pub fn is_checked_out(&self) -> bool {
        self.lock == LockState::Locked
    }

    pub fn is_checked_out_other(&self) -> bool {
        self.lock == LockState::LockedOther
    }

    /// Owner of the lock when someone else holds it.
    pub fn checked_out_by(&self) -> Option<&str> {
        if self.is_checked_out_other() {
            self.lock_owner.as_deref()
        } else {
            None
        }
    }

    /// Staleness is left to the server's hash check, so every file reads as current.
    pub fn is_current(&self) -> bool {
        true
    }

    pub fn is_source_controlled(&self) -> bool {
        !matches!(
            self.working_copy,
            WorkingCopyState::Added | WorkingCopyState::NotControlled
        )
    }

    pub fn is_added(&self) -> bool {
        self.working_copy == WorkingCopyState::Added
    }

    pub fn is_deleted(&self) -> bool {
        self.working_copy == WorkingCopyState::Deleted
    }

    pub fn is_modified(&self) -> bool {
        self.working_copy == WorkingCopyState::Modified
    }

    pub fn is_ignored(&self) -> bool {
        false
    }

    pub fn can_edit(&self) -> bool {
        self.lock == LockState::Locked
    }

    pub fn can_delete(&self) -> bool {
        self.lock == LockState::NotLocked && self.is_source_controlled() && self.is_current()
    }

    pub fn can_revert(&self) -> bool {
        self.can_check_in()
    }

    pub fn display_name(&self) -> String {
        match self.lock {
            LockState::Locked => "Locked For Editing".to_string(),
            LockState::LockedOther => {
                format!("Locked by {}", self.lock_owner.as_deref().unwrap_or_default())
            }
            LockState::NotCurrent => "Not current.".to_string(),
            LockState::Unknown | LockState::NotLocked => String::new(),
        }
    }

    pub fn display_tooltip(&self) -> String {
        match self.lock {
            LockState::Locked => "Locked for editing by current user".to_string(),
            LockState::LockedOther => format!(
                "Locked for editing by: {}",
                self.lock_owner.as_deref().unwrap_or_default()
            ),
            LockState::NotCurrent => "Not current.".to_string(),
            LockState::Unknown | LockState::NotLocked => String::new(),
        }
    }

    /// Host icon identifier; `None` when no overlay applies.
    pub fn icon_name(&self) -> Option<&'static str> {
        match self.lock {
            LockState::Locked => Some("AssetLock.CheckedOut"),
            LockState::LockedOther => Some("AssetLock.CheckedOutByOtherUser"),
            LockState::NotCurrent => Some("AssetLock.NotAtHeadRevision"),
            LockState::Unknown | LockState::NotLocked => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_WORKING_COPY: [WorkingCopyState; 8] = [
        WorkingCopyState::Unknown,
        WorkingCopyState::Unchanged,
        WorkingCopyState::Added,
        WorkingCopyState::Deleted,
        WorkingCopyState::Modified,
        WorkingCopyState::Renamed,
        WorkingCopyState::NotControlled,
        WorkingCopyState::Ignored,
    ];

    const ALL_LOCK: [LockState; 5] = [
        LockState::Unknown,
        LockState::NotLocked,
        LockState::Locked,
        LockState::LockedOther,
        LockState::NotCurrent,
    ];

    fn state(working_copy: WorkingCopyState, lock: LockState) -> FileState {
        FileState {
            working_copy,
            lock,
            ..FileState::new("/repo/Content/Hero.uasset", "Content/Hero.uasset")
        }
    }

    #[test]
    fn test_new_state_defaults() {
        let s = FileState::new("/repo/Content/Hero.uasset", "Content/Hero.uasset");
        assert_eq!(s.working_copy, WorkingCopyState::Unknown);
        assert_eq!(s.lock, LockState::NotLocked);
        assert!(s.lock_owner.is_none());

        let nc = FileState::not_controlled("/repo/readme.txt");
        assert_eq!(nc.working_copy, WorkingCopyState::NotControlled);
        assert!(!nc.is_source_controlled());
    }

    #[test]
    fn test_predicate_table_holds_for_every_combination() {
        for wc in ALL_WORKING_COPY {
            for lock in ALL_LOCK {
                let s = state(wc, lock);
                let added = wc == WorkingCopyState::Added;

                if added {
                    assert!(!s.can_checkout(), "{wc:?}/{lock:?}");
                    assert!(!s.can_check_in(), "{wc:?}/{lock:?}");
                    assert!(!s.can_delete(), "{wc:?}/{lock:?}");
                    continue;
                }

                match lock {
                    LockState::Locked => {
                        assert!(!s.can_checkout());
                        assert!(s.can_check_in());
                        assert!(!s.is_checked_out_other());
                        assert!(!s.can_delete());
                    }
                    LockState::LockedOther => {
                        assert!(!s.can_checkout());
                        assert!(!s.can_check_in());
                        assert!(s.is_checked_out_other());
                        assert!(!s.can_delete());
                    }
                    LockState::NotLocked => {
                        assert!(s.can_checkout());
                        assert!(!s.can_check_in());
                        assert!(!s.is_checked_out_other());
                        let controlled = wc != WorkingCopyState::NotControlled;
                        assert_eq!(s.can_delete(), controlled, "{wc:?}/{lock:?}");
                    }
                    LockState::Unknown | LockState::NotCurrent => {
                        assert!(!s.can_checkout());
                        assert!(!s.can_check_in());
                        assert!(!s.can_delete());
                    }
                }
            }
        }
    }

    #[test]
    fn test_checked_out_by_reports_other_owner_only() {
        let mut s = state(WorkingCopyState::Unchanged, LockState::LockedOther);
        s.lock_owner = Some("bob".to_string());
        assert_eq!(s.checked_out_by(), Some("bob"));
        assert_eq!(s.display_name(), "Locked by bob");

        s.lock = LockState::Locked;
        assert_eq!(s.checked_out_by(), None);
        assert_eq!(s.icon_name(), Some("AssetLock.CheckedOut"));
    }

    #[test]
    fn test_revert_follows_check_in() {
        let s = state(WorkingCopyState::Modified, LockState::Locked);
        assert!(s.can_revert());
        assert!(s.can_edit());
        assert!(s.is_modified());
    }
}
