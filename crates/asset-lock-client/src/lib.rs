//! Source-control provider keeping binary asset locks in sync with a lock server.
//!
//! - [`Dispatcher`]: validates requests, runs workers, reconciles on `tick`
//! - [`StateCache`]: per-file lock and working-copy state
//! - [`HttpLockClient`]: the lock server's HTTP/JSON API
//! - [`GitCli`]: the few git queries the lock layer needs
//! - [`SettingsStore`]: persisted, versioned provider settings

pub mod cache;
pub mod command;
pub mod dispatcher;
pub mod git;
pub mod http;
pub mod settings;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::StateCache;
pub use command::{
    CommandOutcome, CommandRequest, CommandResult, CompletionCallback, Concurrency,
};
pub use dispatcher::{
    Dispatcher, DispatcherOptions, ReapPolicy, StateCacheUsage, LOG_TARGET, NOT_LOGGED_IN,
    PROVIDER_NAME,
};
pub use git::{find_git_binary, find_repo_root, GitCli};
pub use http::HttpLockClient;
pub use settings::{Settings, SettingsSnapshot, SettingsStore, DEFAULT_SERVER_URL};
pub use worker::{OperationKind, Worker, WorkerRegistry};
