use thiserror::Error;

/// Errors that can occur while talking to the lock server or the working copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Rejected before dispatch (wildcards, unsupported extension).
    #[error("Invalid file name: {0}")]
    Validation(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The server never answered.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with `ok: false`, malformed JSON or a mismatched payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Version control error: {0}")]
    Vcs(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LockError {
    /// Reported when a synchronous command does not complete in time.
    pub const SERVER_NOT_RESPONDING: &'static str =
        "Lock server is not responding. Please check your connection and try again.";
}

impl From<std::io::Error> for LockError {
    fn from(err: std::io::Error) -> Self {
        LockError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::Serialization(err.to_string())
    }
}
