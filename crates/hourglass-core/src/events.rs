//! Core events and notification fan-out

use hourglass_api::{ShutdownReason, StartRejection};
use hourglass_host_api::Notifier;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events emitted by the lifecycle core
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Start request refused
    StartRejected { reason: StartRejection },

    /// Start accepted; instance is powering on
    Starting,

    /// Start command issued after the boot grace period
    ServerStarted { command_ok: bool, output: String },

    /// End-of-window warning sent
    WarningIssued { minute_of_hour: u32 },

    /// Status probe failed (idle counter reset)
    ProbeFailed { error: String },

    /// Shutdown sequence started
    ShutdownStarted { reason: ShutdownReason },

    /// Shutdown sequence finished
    ShutdownCompleted {
        reason: ShutdownReason,
        failures: Vec<String>,
    },
}

/// Delivers user-facing notifications and internal events.
///
/// Notification failures are logged and swallowed; a dropped event receiver
/// is ignored.
#[derive(Clone)]
pub struct Announcer {
    notifier: Arc<dyn Notifier>,
    events: Option<mpsc::UnboundedSender<CoreEvent>>,
}

impl Announcer {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<CoreEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn notify(&self, text: &str) {
        debug!(text, "Sending notification");
        if let Err(e) = self.notifier.send(text).await {
            warn!(error = %e, "Notification failed");
        }
    }

    pub fn emit(&self, event: CoreEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
