//! Error types shared across hourglass crates

use thiserror::Error;

/// Failure talking to the lifecycle supervisor
#[derive(Debug, Error)]
pub enum HourglassError {
    /// The supervisor task has exited; its command channel is closed
    #[error("Supervisor is not running")]
    SupervisorGone,
}
