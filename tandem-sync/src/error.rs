//! Error types for tandem-sync.

use std::path::PathBuf;

use thiserror::Error;

use tandem_core::{BoardId, TrackerId};

/// Failures of the local mapping store. Fatal to the current pass.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SQLite failure.
    #[error("mapping store error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Linking would break the one-board-item-per-tracker-item invariant.
    #[error("board item {board_id} is already mapped to tracker item {existing}")]
    BoardAlreadyMapped {
        board_id: BoardId,
        existing: TrackerId,
    },

    /// A stored timestamp could not be parsed.
    #[error("corrupt timestamp `{value}` in mapping for tracker item {tracker_id}")]
    Timestamp { tracker_id: TrackerId, value: String },
}

/// Failures reported by a remote port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    /// Connection failure, timeout, or server-side error. Worth retrying.
    #[error("{operation}: transport failure: {reason}")]
    Transport { operation: String, reason: String },

    /// Non-success response that retrying will not fix.
    #[error("{operation}: unexpected status {status}")]
    Status { operation: String, status: u16 },

    /// Credentials rejected or token acquisition failed.
    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    /// Optimistic-concurrency token was stale.
    #[error("concurrent modification of {id}; token is stale")]
    Conflict { id: String },

    /// Response body did not have the expected shape.
    #[error("{operation}: malformed response: {reason}")]
    Decode { operation: String, reason: String },
}

impl PortError {
    /// Only transport failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Transport { .. })
    }

    pub fn transport(operation: impl Into<String>, reason: impl ToString) -> Self {
        PortError::Transport {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(operation: impl Into<String>, reason: impl ToString) -> Self {
        PortError::Decode {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors that stop a whole sync direction or pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mapping store failed; identity state cannot be trusted.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A listing call failed, so nothing could be diffed in this direction.
    #[error("remote error: {0}")]
    Port(#[from] PortError),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
