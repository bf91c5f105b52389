//! Error types for data collector lifecycle operations.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the reconciler, the client and configuration loading.
///
/// A 404 on read or import is not an error: it is reported as
/// [`Observed::NotFound`](crate::datacollector::Observed::NotFound).
#[derive(Debug, Error)]
pub enum DcError {
    /// A required configuration field is missing or has the wrong shape.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Access token acquisition failed.
    #[error("failed to acquire access token: {0}")]
    CredentialFailure(String),

    /// Import id is not `{project_id}/{name}`.
    #[error("unexpected format of ID ({0}), expected project_id/name")]
    MalformedImportId(String),

    /// Create returned something other than 201.
    #[error("failed to create data collector: {status}")]
    RemoteRejected { status: StatusCode },

    /// Read returned something other than 200 or 404.
    #[error("failed to read data collector: {status}")]
    RemoteReadFailed { status: StatusCode },

    /// Update returned something other than 200.
    #[error("failed to update data collector: {status}")]
    RemoteUpdateFailed { status: StatusCode },

    /// Delete returned something other than 204.
    #[error("failed to delete data collector: {status}")]
    RemoteDeleteFailed { status: StatusCode },

    /// The request never produced a response.
    #[error("failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("failed to parse response JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation ran past its deadline.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

impl DcError {
    /// HTTP status attached to a remote failure, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DcError::RemoteRejected { status }
            | DcError::RemoteReadFailed { status }
            | DcError::RemoteUpdateFailed { status }
            | DcError::RemoteDeleteFailed { status } => Some(*status),
            DcError::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry the same call.
    ///
    /// Connection failures, timeouts, throttling and server errors are
    /// transient. Everything else (4xx, bad payloads, bad input) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            DcError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DcError::DeadlineExceeded => true,
            _ => self
                .status()
                .map(|s| s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
                .unwrap_or(false),
        }
    }
}

/// Convenience Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, DcError>;
