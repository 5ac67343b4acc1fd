//! Event types for hourglassd -> client streaming

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, ShutdownReason, StartRejection, StatusSnapshot};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: hourglass_util::now(),
            payload,
        }
    }
}

/// All possible events from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full status snapshot (sent on subscribe and after every change)
    StateChanged(StatusSnapshot),

    /// A start request was refused
    StartRejected { reason: StartRejection },

    /// Instance powered on and the start command was issued
    ServerStarted {
        /// Whether the remote start command succeeded
        command_ok: bool,
        /// Command output, or the error text when it failed
        output: String,
    },

    /// The "ending soon" warning was sent
    WarningIssued { minute_of_hour: u32 },

    /// A status probe failed; idle time was reset
    ProbeFailed { error: String },

    /// Shutdown sequence started
    ShutdownStarted { reason: ShutdownReason },

    /// Shutdown sequence finished and the lifecycle is back to stopped
    ShutdownCompleted {
        reason: ShutdownReason,
        /// Steps that failed; empty on a clean shutdown
        failures: Vec<String>,
    },

    /// Daemon is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::ShutdownCompleted {
            reason: ShutdownReason::Idle,
            failures: vec![],
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("shutdown_completed"));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.payload,
            EventPayload::ShutdownCompleted {
                reason: ShutdownReason::Idle,
                ..
            }
        ));
    }

    #[test]
    fn state_changed_carries_snapshot() {
        let event = Event::new(EventPayload::StateChanged(StatusSnapshot::initial("UTC", 300)));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        if let EventPayload::StateChanged(snapshot) = parsed.payload {
            assert_eq!(snapshot.timezone, "UTC");
            assert_eq!(snapshot.idle_threshold_secs, 300);
        } else {
            panic!("Expected StateChanged");
        }
    }
}
