//! Error taxonomy for collaborator calls

use std::time::Duration;
use thiserror::Error;

/// Status probe failures. Always transient from the controller's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("status query timed out after {0:?}")]
    Timeout(Duration),

    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("malformed status response: {0}")]
    Malformed(String),
}

/// Remote command execution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The local ssh client could not be launched
    #[error("failed to launch remote session: {0}")]
    Spawn(String),

    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),

    /// Command ran but exited non-zero (or the session failed)
    #[error("remote command failed (exit code {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Cloud power API failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PowerError {
    #[error("cloud API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("cloud API request failed: {0}")]
    Request(String),
}

/// Notification delivery failures. Logged, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification endpoint returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("notification request failed: {0}")]
    Request(String),
}

pub type ProbeResult<T> = Result<T, ProbeFailure>;
pub type ExecResult<T> = Result<T, ExecError>;
pub type PowerResult<T> = Result<T, PowerError>;
pub type NotifyResult<T> = Result<T, NotifyError>;
