//! Core traits and types for the asset-lock exclusive locking layer.
//!
//! This crate defines the pieces shared by every client of the lock server:
//! - `LockService`: the remote lock protocol
//! - `VersionControl`: the few queries made against the underlying working copy
//! - `FileState`: cached lock and working-copy status of one file
//! - `FilenamePolicy`: which assets may be locked at all

mod error;
mod filename;
mod lock;
mod state;
mod vcs;

pub use error::LockError;
pub use filename::{absolute_path, git_path, FilenamePolicy, DEFAULT_EXTENSIONS};
pub use lock::{LockInfo, LockItem, LockScope, LockService, LockedFile};
pub use state::{FileState, LockState, WorkingCopyState};
pub use vcs::{RepoContext, VersionControl};
