//! Errors raised while driving a run through its lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use terrapin_proto::{BackendError, ConfigurationVersionStatus};

use crate::packager::PackageError;
use crate::variables::VariableError;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Invalid combination of inputs, detected before any remote call.
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Variables(#[from] VariableError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("configuration version {id} upload failed with status {status}")]
    UploadFailed {
        id: String,
        status: ConfigurationVersionStatus,
    },

    /// A plan or apply stage ended in a status other than success.
    #[error("{stage} failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },

    /// The backend accepted a request but answered with a shape that breaks its contract.
    #[error("unexpected state: {0}")]
    UnexpectedState(String),

    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: &'static str,
        after: Duration,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read user input: {0}")]
    Prompt(#[source] std::io::Error),
}

impl RunError {
    /// Returns true when the failure was caught before anything was sent to the backend.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RunError::InvalidInput(_) | RunError::Variables(_) | RunError::Package(_)
        )
    }
}
