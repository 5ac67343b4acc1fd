//! Human-readable rendering of daemon responses and events

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use hourglass_api::{Event, EventPayload, HealthStatus, ResponsePayload, StatusSnapshot};
use hourglass_util::format_duration;
use std::time::Duration;

/// Timestamp in the daemon's configured zone, falling back to UTC
fn local_time(at: DateTime<Utc>, timezone: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => at.with_timezone(&tz).format("%a %Y-%m-%d %H:%M:%S %Z").to_string(),
        Err(_) => at.format("%a %Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

pub fn status(s: &StatusSnapshot) -> String {
    let players = s
        .last_player_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".into());

    let mut out = vec![
        format!("State:        {}", s.state),
        format!("Players:      {}", players),
        format!(
            "Idle:         {} of {}",
            format_duration(Duration::from_secs(s.idle_secs)),
            format_duration(Duration::from_secs(s.idle_threshold_secs))
        ),
        format!(
            "Schedule:     {}",
            if s.within_window {
                "inside allowed hours"
            } else {
                "outside allowed hours"
            }
        ),
    ];
    if s.warned {
        out.push("Warning:      shutdown warning sent".into());
    }
    out.push(format!("Observed:     {}", local_time(s.observed_at, &s.timezone)));
    out.join("\n")
}

pub fn health(h: &HealthStatus) -> String {
    let mark = |ok: bool| if ok { "ok" } else { "FAILED" };
    [
        format!("live:        {}", mark(h.live)),
        format!("ready:       {}", mark(h.ready)),
        format!("config:      {}", mark(h.config_loaded)),
        format!("supervisor:  {}", mark(h.supervisor_ok)),
    ]
    .join("\n")
}

/// One-line answer to a command
pub fn payload(p: &ResponsePayload) -> String {
    match p {
        ResponsePayload::Status(s) => status(s),
        ResponsePayload::StartAccepted => "Start accepted; the server is powering on.".into(),
        ResponsePayload::StartRejected { reason } => format!("Start rejected: {}", reason),
        ResponsePayload::StopAccepted => "Stop accepted; shutting the server down.".into(),
        ResponsePayload::StopRejected { state } => {
            format!("Stop rejected: server is {}", state)
        }
        ResponsePayload::Subscribed { client_id } => format!("Subscribed as {}", client_id),
        ResponsePayload::Unsubscribed => "Unsubscribed".into(),
        ResponsePayload::Health(h) => health(h),
        ResponsePayload::Pong => "pong".into(),
    }
}

/// One line per event for `watch`
pub fn event(e: &Event) -> String {
    let at = e.timestamp.format("%H:%M:%S");
    let text = match &e.payload {
        EventPayload::StateChanged(s) => {
            let players = s
                .last_player_count
                .map(|n| format!(", {} players", n))
                .unwrap_or_default();
            format!("state {}{}, idle {}s", s.state, players, s.idle_secs)
        }
        EventPayload::StartRejected { reason } => format!("start rejected: {}", reason),
        EventPayload::ServerStarted { command_ok, output } => {
            let first = output.lines().next().unwrap_or_default();
            if *command_ok {
                format!("server started: {}", first)
            } else {
                format!("start command failed: {}", first)
            }
        }
        EventPayload::WarningIssued { minute_of_hour } => {
            format!("shutdown warning issued at minute {}", minute_of_hour)
        }
        EventPayload::ProbeFailed { error } => format!("probe failed: {}", error),
        EventPayload::ShutdownStarted { reason } => format!("shutting down ({})", reason),
        EventPayload::ShutdownCompleted { reason, failures } => {
            if failures.is_empty() {
                format!("shutdown complete ({})", reason)
            } else {
                format!("shutdown incomplete ({}): {}", reason, failures.join("; "))
            }
        }
        EventPayload::Shutdown => "daemon shutting down".into(),
    };
    format!("[{} UTC] {}", at, text)
}
