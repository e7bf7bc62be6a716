use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::worker::Worker;

/// How a command is run relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// Caller blocks until the command is reconciled.
    #[default]
    Synchronous,
    /// Runs on the pool; reconciled by a later tick.
    Asynchronous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Succeeded,
    Failed,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Succeeded => write!(f, "succeeded"),
            CommandResult::Failed => write!(f, "failed"),
        }
    }
}

/// Info and error messages accumulated while a worker runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLog {
    pub info: Vec<String>,
    pub errors: Vec<String>,
}

impl CommandLog {
    pub fn info(&mut self, message: impl Into<String>) {
        self.info.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// What the caller (and the completion callback) learns about a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Operation name as requested
    pub operation: String,
    pub result: CommandResult,
    pub info_messages: Vec<String>,
    pub error_messages: Vec<String>,
}

impl CommandOutcome {
    pub fn new(operation: impl Into<String>, success: bool, log: CommandLog) -> Self {
        Self {
            operation: operation.into(),
            result: if success {
                CommandResult::Succeeded
            } else {
                CommandResult::Failed
            },
            info_messages: log.info,
            error_messages: log.errors,
        }
    }

    pub fn failed(operation: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            operation: operation.into(),
            result: CommandResult::Failed,
            info_messages: Vec::new(),
            error_messages: errors,
        }
    }

    /// Outcome of a command handed to the pool: accepted, not yet run.
    pub fn queued(operation: impl Into<String>) -> Self {
        Self::new(operation, true, CommandLog::default())
    }

    pub fn succeeded(&self) -> bool {
        self.result == CommandResult::Succeeded
    }
}

/// Invoked once on the dispatching thread when a command completes.
pub type CompletionCallback = Box<dyn FnOnce(&CommandOutcome)>;

/// An operation request as submitted by the host.
pub struct CommandRequest {
    pub(crate) operation: String,
    pub(crate) files: Vec<PathBuf>,
    pub(crate) concurrency: Concurrency,
    pub(crate) callback: Option<CompletionCallback>,
}

impl CommandRequest {
    /// A synchronous request for `operation` over `files`.
    pub fn new<I, P>(operation: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            operation: operation.into(),
            files: files.into_iter().map(Into::into).collect(),
            concurrency: Concurrency::Synchronous,
            callback: None,
        }
    }

    pub fn asynchronous(mut self) -> Self {
        self.concurrency = Concurrency::Asynchronous;
        self
    }

    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce(&CommandOutcome) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRequest")
            .field("operation", &self.operation)
            .field("files", &self.files)
            .field("concurrency", &self.concurrency)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// A dispatched command awaiting reconciliation.
pub(crate) struct Command {
    pub operation: String,
    pub completion: Arc<Completion>,
    /// Taken when fired; a timed-out synchronous command has none left.
    pub callback: Option<CompletionCallback>,
}

impl Command {
    pub fn new(operation: String, callback: Option<CompletionCallback>) -> Self {
        Self {
            operation,
            completion: Arc::new(Completion::default()),
            callback,
        }
    }

    /// Fire the callback if it has not fired yet.
    pub fn notify(&mut self, outcome: &CommandOutcome) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

/// A worker after its `execute` phase.
#[derive(Debug)]
pub(crate) struct Executed {
    pub worker: Worker,
    pub success: bool,
    pub log: CommandLog,
}

/// Hand-off between a pool task and the dispatcher.
///
/// `done` flips false to true exactly once, after the executed worker has
/// been stored.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    done: AtomicBool,
    executed: Mutex<Option<Executed>>,
    signal: Condvar,
}

impl Completion {
    pub fn finish(&self, executed: Executed) {
        let mut slot = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(executed);
        self.done.store(true, Ordering::Release);
        self.signal.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Block until finished or `timeout` elapses. Returns whether it finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        let slot = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
        let (_slot, result) = self
            .signal
            .wait_timeout_while(slot, timeout, |executed| executed.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    pub fn take(&self) -> Option<Executed> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn executed() -> Executed {
        Executed {
            worker: Worker::Revert,
            success: true,
            log: CommandLog::default(),
        }
    }

    #[test]
    fn test_wait_returns_once_finished() {
        let completion = Arc::new(Completion::default());
        let remote = completion.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.finish(executed());
        });

        assert!(completion.wait(Duration::from_secs(5)));
        assert!(completion.is_done());
        assert!(completion.take().is_some());
        assert!(completion.take().is_none());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_times_out() {
        let completion = Completion::default();
        assert!(!completion.wait(Duration::from_millis(10)));
        assert!(!completion.is_done());
    }

    #[test]
    fn test_outcome_from_log() {
        let mut log = CommandLog::default();
        log.info("locked 1 file");
        let outcome = CommandOutcome::new("CheckOut", true, log);
        assert!(outcome.succeeded());
        assert_eq!(outcome.info_messages, vec!["locked 1 file".to_string()]);

        let failed = CommandOutcome::failed("CheckOut", vec!["denied".to_string()]);
        assert_eq!(failed.result, CommandResult::Failed);
    }
}
