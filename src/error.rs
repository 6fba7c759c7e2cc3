use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the synchronization engine.
///
/// `NotFound`, `Auth` and `Api` abort a whole run. The command variants are
/// per-target and get folded into a failed [`SyncOutcome`](crate::SyncOutcome)
/// at the sync/reconcile boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("directory not found or not a directory: {}", .0.display())]
    NotFound(PathBuf),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("API request failed: {0}")]
    Api(String),

    #[error("`git {command}` exited with status {status}: {stderr}")]
    CommandFailure {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("`git {command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("failed to launch `git {command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote mismatch: {0}")]
    RemoteMismatch(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// True for errors that must abort the whole run rather than a single target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound(_) | SyncError::Auth(_) | SyncError::Api(_)
        )
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
