//! Sync round failures

use reqwest::StatusCode;
use thiserror::Error;

/// Why a sync round did not complete. The queue and watermark are untouched
/// whenever one of these is returned.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Sync request timed out")]
    Timeout,

    #[error("Sync server error: {message} ({status})")]
    Server { status: u16, message: String },

    #[error("Sync rejected: {0}")]
    Rejected(String),

    /// The server refused part of the batch; resending it unchanged fails
    /// again until the offending queue entries are discarded.
    #[error("Sync conflict: {0}")]
    Conflict(String),

    #[error("Local storage error during sync: {0}")]
    LocalStorage(#[from] crate::Error),
}

impl SyncError {
    /// Whether a later trigger may retry the same batch.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::LocalStorage(_) | Self::Conflict(_))
    }

    pub(crate) fn from_status(status: StatusCode, message: String) -> Self {
        if status.is_server_error() {
            Self::Server {
                status: status.as_u16(),
                message,
            }
        } else if status == StatusCode::CONFLICT {
            Self::Conflict(message)
        } else {
            Self::Rejected(format!("{message} ({})", status.as_u16()))
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Rejected(format!("Malformed sync response: {error}"))
        } else {
            Self::Network(error)
        }
    }
}
