//! Lifecycle controller: idle detection, end-of-window warnings, shutdown

use chrono::DateTime;
use chrono_tz::Tz;
use hourglass_api::{API_VERSION, LifecycleState, ShutdownReason, StatusSnapshot};
use hourglass_config::{
    DEFAULT_IDLE_SHUTDOWN_SECS, DEFAULT_POWER_OFF_COMMAND, DEFAULT_STOP_COMMAND,
    DEFAULT_TICK_INTERVAL_SECS, DEFAULT_WARNING_MINUTE, Settings,
};
use hourglass_host_api::{
    CloudPower, Notifier, PlayerCount, RemoteCommand, RemoteShell, StatusProbe,
};
use hourglass_util::WeeklySchedule;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{Announcer, Clock, CoreEvent, SystemClock, evaluate};

/// The external systems the controller drives
#[derive(Clone)]
pub struct Collaborators {
    pub cloud: Arc<dyn CloudPower>,
    pub shell: Arc<dyn RemoteShell>,
    pub probe: Arc<dyn StatusProbe>,
    pub notifier: Arc<dyn Notifier>,
}

/// Controller configuration, taken from the validated [`Settings`]
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub schedule: WeeklySchedule,
    pub timezone: Tz,
    pub tick_interval: Duration,
    pub idle_threshold: Duration,
    pub warning_minute: u32,
    pub start_command: String,
    pub stop_command: String,
    pub power_off_command: String,
}

impl ControllerSettings {
    /// Settings with default timings and commands
    pub fn new(schedule: WeeklySchedule, timezone: Tz, start_command: impl Into<String>) -> Self {
        Self {
            schedule,
            timezone,
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_SHUTDOWN_SECS),
            warning_minute: DEFAULT_WARNING_MINUTE,
            start_command: start_command.into(),
            stop_command: DEFAULT_STOP_COMMAND.into(),
            power_off_command: DEFAULT_POWER_OFF_COMMAND.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            schedule: settings.schedule,
            timezone: settings.daemon.timezone,
            tick_interval: settings.daemon.tick_interval,
            idle_threshold: settings.daemon.idle_threshold,
            warning_minute: settings.daemon.warning_minute,
            start_command: settings.remote.start_command.clone(),
            stop_command: settings.remote.stop_command.clone(),
            power_off_command: settings.remote.power_off_command.clone(),
        }
    }

    /// Number of minutes after the hour during which a tick counts as the
    /// top of the hour. One tick period, rounded up to whole minutes, and
    /// never the whole hour.
    pub fn top_of_hour_minutes(&self) -> u32 {
        self.tick_interval.as_secs().div_ceil(60).clamp(1, 59) as u32
    }

    pub fn warning_message(&self) -> String {
        format!(
            "⚠️ Server will shut down in {} minutes (end of scheduled hours).",
            60u32.saturating_sub(self.warning_minute)
        )
    }
}

/// Result of one controller tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Lifecycle is not running; nothing was probed
    NotRunning,
    /// Probe failed; idle counter reset, rest of the tick skipped
    ProbeFailed,
    /// Server stays up
    Continue { players: u32 },
    /// End-of-window warning was sent
    Warned,
    /// Shutdown sequence ran to completion
    ShutDown(ShutdownReport),
}

/// What happened during a shutdown sequence
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    /// Failed steps; empty on a clean shutdown
    pub failures: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

fn shutdown_message(reason: ShutdownReason) -> &'static str {
    match reason {
        ShutdownReason::Idle => "⚠️ No players detected. Server shutting down.",
        ShutdownReason::Schedule => "⏰ Server shutting down (outside allowed hours).",
        ShutdownReason::Requested => "🛑 Server stop requested. Shutting down.",
    }
}

/// Owns the lifecycle state, the idle counter and the warning flag.
///
/// All three are private; they change only through [`tick`](Self::tick),
/// the shutdown sequence, and the start guard.
pub struct LifecycleController {
    settings: ControllerSettings,
    collaborators: Collaborators,
    announcer: Announcer,
    clock: Arc<dyn Clock>,
    status: Option<watch::Sender<StatusSnapshot>>,

    state: LifecycleState,
    idle_for: Duration,
    warned: bool,
    last_player_count: Option<u32>,
}

impl LifecycleController {
    pub fn new(settings: ControllerSettings, collaborators: Collaborators) -> Self {
        info!(
            timezone = %settings.timezone,
            tick_secs = settings.tick_interval.as_secs(),
            idle_threshold_secs = settings.idle_threshold.as_secs(),
            "Lifecycle controller initialized"
        );

        Self {
            announcer: Announcer::new(collaborators.notifier.clone()),
            settings,
            collaborators,
            clock: Arc::new(SystemClock),
            status: None,
            state: LifecycleState::Stopped,
            idle_for: Duration::ZERO,
            warned: false,
            last_player_count: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Forward core events to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<CoreEvent>) -> Self {
        self.announcer = self.announcer.with_events(tx);
        self
    }

    /// Publish a fresh snapshot to `tx` after every change
    pub fn with_status_channel(mut self, tx: watch::Sender<StatusSnapshot>) -> Self {
        self.status = Some(tx);
        self.publish();
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn idle_for(&self) -> Duration {
        self.idle_for
    }

    pub fn warned(&self) -> bool {
        self.warned
    }

    pub fn last_player_count(&self) -> Option<u32> {
        self.last_player_count
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub(crate) fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub(crate) fn announcer(&self) -> &Announcer {
        &self.announcer
    }

    /// Current instant in the schedule's timezone
    pub fn local_now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.settings.timezone)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let now = self.clock.now();
        let local = now.with_timezone(&self.settings.timezone);

        StatusSnapshot {
            api_version: API_VERSION,
            state: self.state,
            idle_secs: self.idle_for.as_secs(),
            idle_threshold_secs: self.settings.idle_threshold.as_secs(),
            warned: self.warned,
            last_player_count: self.last_player_count,
            within_window: evaluate(&self.settings.schedule, &local).within_window,
            timezone: self.settings.timezone.name().to_string(),
            observed_at: now,
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.status {
            tx.send_replace(self.snapshot());
        }
    }

    fn set_state(&mut self, state: LifecycleState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Lifecycle transition");
        }
        self.state = state;
        self.publish();
    }

    fn reset_counters(&mut self) {
        self.idle_for = Duration::ZERO;
        self.warned = false;
    }

    pub(crate) fn mark_starting(&mut self) {
        self.set_state(LifecycleState::Starting);
    }

    pub(crate) fn mark_running(&mut self) {
        self.reset_counters();
        self.set_state(LifecycleState::Running);
    }

    /// Take over a server found running at startup
    pub(crate) fn adopt_running(&mut self, players: PlayerCount) {
        info!(players = players.get(), "Adopting already running server");
        self.last_player_count = Some(players.get());
        self.mark_running();
    }

    /// One monitoring step. Does nothing unless the lifecycle is running.
    pub async fn tick(&mut self, now: DateTime<Tz>) -> TickOutcome {
        if self.state != LifecycleState::Running {
            return TickOutcome::NotRunning;
        }

        let players = match self.collaborators.probe.probe().await {
            Ok(count) => count.get(),
            Err(e) => {
                // Unknown is not empty: never count a failed probe as idle time
                warn!(error = %e, "Status probe failed, resetting idle counter");
                self.idle_for = Duration::ZERO;
                self.announcer.emit(CoreEvent::ProbeFailed {
                    error: e.to_string(),
                });
                self.publish();
                return TickOutcome::ProbeFailed;
            }
        };

        self.last_player_count = Some(players);
        if players == 0 {
            self.idle_for += self.settings.tick_interval;
        } else {
            self.idle_for = Duration::ZERO;
        }
        debug!(players, idle_secs = self.idle_for.as_secs(), "Status probe");

        if self.idle_for >= self.settings.idle_threshold {
            info!(
                idle_secs = self.idle_for.as_secs(),
                "No players for the idle threshold"
            );
            let report = self.shutdown(ShutdownReason::Idle).await;
            return TickOutcome::ShutDown(report);
        }

        let schedule = evaluate(&self.settings.schedule, &now);
        if schedule.within_window {
            if self.warned {
                debug!("Back inside an allowed window, clearing warning");
            }
            self.warned = false;
            self.publish();
            return TickOutcome::Continue { players };
        }

        if !self.warned && schedule.minute_of_hour >= self.settings.warning_minute {
            info!(
                minute = schedule.minute_of_hour,
                "Outside allowed hours, sending shutdown warning"
            );
            self.warned = true;
            self.announcer.notify(&self.settings.warning_message()).await;
            self.announcer.emit(CoreEvent::WarningIssued {
                minute_of_hour: schedule.minute_of_hour,
            });
            self.publish();
            return TickOutcome::Warned;
        }

        if self.warned && schedule.minute_of_hour < self.settings.top_of_hour_minutes() {
            info!("Outside allowed hours at the top of the hour, shutting down");
            let report = self.shutdown(ShutdownReason::Schedule).await;
            return TickOutcome::ShutDown(report);
        }

        self.publish();
        TickOutcome::Continue { players }
    }

    /// Manual stop. Rejected with the current state unless running.
    pub async fn request_stop(&mut self) -> Result<ShutdownReport, LifecycleState> {
        if self.state != LifecycleState::Running {
            return Err(self.state);
        }
        Ok(self.shutdown(ShutdownReason::Requested).await)
    }

    /// Run the shutdown sequence to completion.
    ///
    /// Remote failures are collected, not propagated: the lifecycle always
    /// ends up `Stopped`.
    pub(crate) async fn shutdown(&mut self, reason: ShutdownReason) -> ShutdownReport {
        self.set_state(LifecycleState::ShuttingDown);
        self.announcer.emit(CoreEvent::ShutdownStarted { reason });
        self.announcer.notify(shutdown_message(reason)).await;

        let mut failures = Vec::new();

        let stop = RemoteCommand::wait(self.settings.stop_command.clone()).in_working_dir();
        if let Err(e) = self.collaborators.shell.run(&stop).await {
            warn!(error = %e, "Graceful stop command failed");
            failures.push(format!("stop command: {}", e));
        }

        let power_off = RemoteCommand::wait(self.settings.power_off_command.clone());
        if let Err(exec_err) = self.collaborators.shell.run(&power_off).await {
            warn!(error = %exec_err, "Power-off command failed, falling back to cloud API");
            if let Err(power_err) = self.collaborators.cloud.power_off().await {
                warn!(error = %power_err, "Cloud power-off failed");
                failures.push(format!(
                    "power-off: {} (cloud fallback: {})",
                    exec_err, power_err
                ));
            }
        }

        self.reset_counters();
        self.set_state(LifecycleState::Stopped);

        if failures.is_empty() {
            info!(%reason, "Shutdown complete");
        } else {
            warn!(%reason, failures = failures.len(), "Shutdown incomplete");
            self.announcer
                .notify(&format!("⚠️ Shutdown incomplete:\n{}", failures.join("\n")))
                .await;
        }

        self.announcer.emit(CoreEvent::ShutdownCompleted {
            reason,
            failures: failures.clone(),
        });

        ShutdownReport { reason, failures }
    }
}
