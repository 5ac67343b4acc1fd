//! Shared types for the hourglassd API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the managed game server instance.
///
/// `Stopped -> Starting -> Running` is driven by the start guard,
/// `Running -> ShuttingDown -> Stopped` by the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Running,
    ShuttingDown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a start request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartRejection {
    /// Lifecycle is running or shutting down, or the server answered a status probe
    AlreadyRunning,
    /// A previous start request is still booting the instance
    StartInProgress,
    /// Current local hour is not in the allowed set for today
    OutsideAllowedWindow,
}

impl fmt::Display for StartRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartRejection::AlreadyRunning => write!(f, "server is already running"),
            StartRejection::StartInProgress => write!(f, "a start is already in progress"),
            StartRejection::OutsideAllowedWindow => {
                write!(f, "server can't be started at this hour")
            }
        }
    }
}

/// Why the shutdown sequence was run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// No players for the configured idle threshold
    Idle,
    /// The allowed window ended
    Schedule,
    /// A client asked for it
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Idle => write!(f, "idle"),
            ShutdownReason::Schedule => write!(f, "schedule"),
            ShutdownReason::Requested => write!(f, "requested"),
        }
    }
}

/// Point-in-time view of the lifecycle controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub api_version: u32,
    pub state: LifecycleState,
    /// Accumulated zero-player time
    pub idle_secs: u64,
    pub idle_threshold_secs: u64,
    /// Whether the "ending soon" warning has been sent for this window
    pub warned: bool,
    /// Player count from the most recent successful probe
    pub last_player_count: Option<u32>,
    /// Whether the current instant is inside an allowed hour
    pub within_window: bool,
    /// IANA timezone the schedule is evaluated in
    pub timezone: String,
    pub observed_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn initial(timezone: impl Into<String>, idle_threshold_secs: u64) -> Self {
        Self {
            api_version: crate::API_VERSION,
            state: LifecycleState::Stopped,
            idle_secs: 0,
            idle_threshold_secs,
            warned: false,
            last_player_count: None,
            within_window: false,
            timezone: timezone.into(),
            observed_at: hourglass_util::now(),
        }
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub config_loaded: bool,
    /// Supervisor task is still accepting commands
    pub supervisor_ok: bool,
}
