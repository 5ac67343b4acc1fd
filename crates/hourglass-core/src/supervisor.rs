//! Supervisor task: owns the controller, serializes requests, drives ticks

use hourglass_api::{LifecycleState, ShutdownReason, StartRejection, StatusSnapshot};
use hourglass_util::HourglassError;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    Announcer, CoreEvent, LifecycleController, Shutdown, StartGuard, StartReport, TickOutcome,
    rejection_message,
};

/// Requests handled by the supervisor, one at a time
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Reply is sent as soon as admission is decided; the boot continues afterwards
    Start {
        reply: oneshot::Sender<Result<(), StartRejection>>,
    },
    /// Reply is sent before the shutdown sequence runs
    Stop {
        reply: oneshot::Sender<Result<(), LifecycleState>>,
    },
}

/// Cloneable handle for talking to a running [`Supervisor`]
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
    status: watch::Receiver<StatusSnapshot>,
}

impl SupervisorHandle {
    pub async fn start(&self) -> Result<Result<(), StartRejection>, HourglassError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SupervisorCommand::Start { reply })
            .await
            .map_err(|_| HourglassError::SupervisorGone)?;
        rx.await.map_err(|_| HourglassError::SupervisorGone)
    }

    pub async fn stop(&self) -> Result<Result<(), LifecycleState>, HourglassError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SupervisorCommand::Stop { reply })
            .await
            .map_err(|_| HourglassError::SupervisorGone)?;
        rx.await.map_err(|_| HourglassError::SupervisorGone)
    }

    /// Latest published status. Never waits on the supervisor.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Single task that owns the [`LifecycleController`] and [`StartGuard`]
pub struct Supervisor {
    controller: LifecycleController,
    guard: StartGuard,
    cool_down: Duration,
    commands: mpsc::Receiver<SupervisorCommand>,
    shutdown: Shutdown,
}

impl Supervisor {
    pub fn new(
        controller: LifecycleController,
        guard: StartGuard,
        cool_down: Duration,
        shutdown: Shutdown,
    ) -> (Self, SupervisorHandle) {
        let (status_tx, status_rx) = watch::channel(controller.snapshot());
        let controller = controller.with_status_channel(status_tx);
        let (commands_tx, commands_rx) = mpsc::channel(16);

        let supervisor = Self {
            controller,
            guard,
            cool_down,
            commands: commands_rx,
            shutdown,
        };
        let handle = SupervisorHandle {
            commands: commands_tx,
            status: status_rx,
        };
        (supervisor, handle)
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    /// Probe once; if the server answers, start out `Running`
    pub async fn adopt_if_running(&mut self) -> bool {
        match self.controller.collaborators().probe.probe().await {
            Ok(players) => {
                self.controller.adopt_running(players);
                true
            }
            Err(e) => {
                debug!(error = %e, "No server answering");
                false
            }
        }
    }

    /// Run until shutdown is triggered or every handle is dropped
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.controller.settings().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.reset();

        info!(state = %self.controller.state(), "Supervisor started");

        loop {
            let running = self.controller.state() == LifecycleState::Running;

            tokio::select! {
                _ = self.shutdown.triggered() => {
                    info!("Supervisor stopping");
                    break;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        info!("All supervisor handles dropped");
                        break;
                    };
                    if self.handle_command(command).await {
                        // First tick one full period after the server came up
                        ticker.reset();
                    }
                }
                _ = ticker.tick(), if running => {
                    let now = self.controller.local_now();
                    if let TickOutcome::ShutDown(_) = self.controller.tick(now).await
                        && self.cool_down().await
                    {
                        ticker.reset();
                    }
                }
            }
        }
    }

    /// Returns true when the lifecycle entered `Running`
    async fn handle_command(&mut self, command: SupervisorCommand) -> bool {
        match command {
            SupervisorCommand::Start { reply } => {
                if let Err(reason) = self.guard.check(&self.controller).await {
                    let _ = reply.send(Err(reason));
                    return false;
                }
                let _ = reply.send(Ok(()));
                matches!(self.launch().await, StartReport::Started { .. })
            }
            SupervisorCommand::Stop { reply } => {
                let state = self.controller.state();
                if state != LifecycleState::Running {
                    debug!(%state, "Stop rejected");
                    let _ = reply.send(Err(state));
                    return false;
                }
                let _ = reply.send(Ok(()));
                self.controller.shutdown(ShutdownReason::Requested).await;
                self.cool_down().await
            }
        }
    }

    /// Run the start sequence while still answering requests that arrive
    /// during the boot wait
    async fn launch(&mut self) -> StartReport {
        let announcer = self.controller.announcer().clone();
        let launch = self.guard.launch(&mut self.controller, &mut self.shutdown);
        tokio::pin!(launch);

        loop {
            tokio::select! {
                report = &mut launch => return report,
                Some(command) = self.commands.recv() => reject_busy(command, &announcer).await,
            }
        }
    }

    /// Wait out the cool-down, then probe once. Returns true when the
    /// server still answers and monitoring resumes.
    async fn cool_down(&mut self) -> bool {
        info!(secs = self.cool_down.as_secs(), "Cooling down after shutdown");
        if !self.shutdown.sleep(self.cool_down).await {
            debug!("Cool-down interrupted by shutdown");
            return false;
        }
        if self.controller.state() != LifecycleState::Stopped {
            return false;
        }

        let resumed = self.adopt_if_running().await;
        if resumed {
            warn!("Server still answering after shutdown, resuming monitoring");
        }
        resumed
    }
}

async fn reject_busy(command: SupervisorCommand, announcer: &Announcer) {
    match command {
        SupervisorCommand::Start { reply } => {
            let reason = StartRejection::StartInProgress;
            announcer.notify(rejection_message(reason)).await;
            announcer.emit(CoreEvent::StartRejected { reason });
            let _ = reply.send(Err(reason));
        }
        SupervisorCommand::Stop { reply } => {
            let _ = reply.send(Err(LifecycleState::Starting));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collaborators, ControllerSettings, ManualClock};
    use chrono::{TimeZone, Utc, Weekday};
    use chrono_tz::Europe::Warsaw;
    use hourglass_host_api::{MockCloud, MockNotifier, MockProbe, MockShell};
    use hourglass_util::{HourSet, WeeklySchedule};
    use std::sync::Arc;

    struct Fixture {
        probe: Arc<MockProbe>,
        shell: Arc<MockShell>,
        cloud: Arc<MockCloud>,
        notifier: Arc<MockNotifier>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                probe: Arc::new(MockProbe::unreachable()),
                shell: Arc::new(MockShell::new()),
                cloud: Arc::new(MockCloud::new()),
                notifier: Arc::new(MockNotifier::new()),
            }
        }

        /// Supervisor with the clock fixed at Monday 14:10 Warsaw, inside the window
        fn supervisor(&self, shutdown: Shutdown) -> (Supervisor, SupervisorHandle) {
            let schedule =
                WeeklySchedule::new().with_day(Weekday::Mon, HourSet::from_hours([14]).unwrap());
            let settings = ControllerSettings::new(schedule, Warsaw, "./start.sh");
            let collaborators = Collaborators {
                cloud: self.cloud.clone(),
                shell: self.shell.clone(),
                probe: self.probe.clone(),
                notifier: self.notifier.clone(),
            };
            let local = Warsaw.with_ymd_and_hms(2025, 12, 29, 14, 10, 0).unwrap();
            let clock = Arc::new(ManualClock::new(local.with_timezone(&Utc)));

            let controller = LifecycleController::new(settings, collaborators).with_clock(clock);
            Supervisor::new(
                controller,
                StartGuard::new(Duration::from_secs(60)),
                Duration::from_secs(300),
                shutdown,
            )
        }
    }

    async fn wait_for_state(handle: &SupervisorHandle, state: LifecycleState) {
        let mut rx = handle.watch_status();
        while rx.borrow_and_update().state != state {
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_starts_power_on_once() {
        let fx = Fixture::new();
        let (supervisor, handle) = fx.supervisor(Shutdown::never());
        tokio::spawn(supervisor.run());

        let (first, second) = tokio::join!(handle.start(), handle.start());

        assert_eq!(first.unwrap(), Ok(()));
        assert_eq!(second.unwrap(), Err(StartRejection::StartInProgress));

        wait_for_state(&handle, LifecycleState::Running).await;
        assert_eq!(fx.cloud.power_on_calls(), 1);
        assert_eq!(fx.notifier.count_containing("already starting"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_available_during_boot() {
        let fx = Fixture::new();
        let (supervisor, handle) = fx.supervisor(Shutdown::never());
        tokio::spawn(supervisor.run());

        handle.start().await.unwrap().unwrap();
        wait_for_state(&handle, LifecycleState::Starting).await;
        assert_eq!(handle.status().state, LifecycleState::Starting);

        assert_eq!(handle.stop().await.unwrap(), Err(LifecycleState::Starting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_server_shut_down_by_ticks() {
        let fx = Fixture::new();
        let (supervisor, handle) = fx.supervisor(Shutdown::never());
        tokio::spawn(supervisor.run());

        handle.start().await.unwrap().unwrap();
        wait_for_state(&handle, LifecycleState::Running).await;

        // Server is up now and empty
        fx.probe.set_players(0);
        wait_for_state(&handle, LifecycleState::Stopped).await;

        assert_eq!(
            fx.shell.command_lines(),
            vec![
                "./start.sh".to_string(),
                hourglass_config::DEFAULT_STOP_COMMAND.to_string(),
                "poweroff".to_string()
            ]
        );
        assert_eq!(fx.notifier.count_containing("No players detected"), 1);

        // Powered off for real: one check after the cool-down, then no probing
        fx.probe.set_unreachable();
        let calls = fx.probe.calls();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fx.probe.calls(), calls + 1);
        assert_eq!(handle.status().state, LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_resumes_when_server_survives_shutdown() {
        let fx = Fixture::new();
        fx.probe.set_players(0);
        fx.shell.fail_on("poweroff");
        *fx.cloud.fail_power_off.lock().unwrap() = true;
        let (mut supervisor, handle) = fx.supervisor(Shutdown::never());
        assert!(supervisor.adopt_if_running().await);
        tokio::spawn(supervisor.run());

        wait_for_state(&handle, LifecycleState::Stopped).await;

        // Still answering after the cool-down, so idle detection runs again
        wait_for_state(&handle, LifecycleState::Running).await;
        assert_eq!(fx.notifier.count_containing("Shutdown incomplete"), 1);

        wait_for_state(&handle, LifecycleState::Stopped).await;
        assert_eq!(fx.notifier.count_containing("No players detected"), 2);
        assert_eq!(fx.cloud.power_off_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_shutdown_completes_power_off() {
        let fx = Fixture::new();
        fx.probe.set_players(2);
        *fx.shell.run_delay.lock().unwrap() = Some(Duration::from_secs(10));
        let (trigger, shutdown) = Shutdown::pair();
        let (mut supervisor, handle) = fx.supervisor(shutdown);
        assert!(supervisor.adopt_if_running().await);
        let task = tokio::spawn(supervisor.run());

        assert_eq!(handle.stop().await.unwrap(), Ok(()));
        wait_for_state(&handle, LifecycleState::ShuttingDown).await;
        trigger.trigger();
        task.await.unwrap();

        assert_eq!(
            fx.shell.command_lines(),
            vec![
                hourglass_config::DEFAULT_STOP_COMMAND.to_string(),
                "poweroff".to_string()
            ]
        );
        assert_eq!(handle.status().state, LifecycleState::Stopped);
        assert_eq!(fx.cloud.power_off_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_waits_for_power_on() {
        let fx = Fixture::new();
        *fx.cloud.power_on_delay.lock().unwrap() = Some(Duration::from_secs(30));
        let (supervisor, handle) = fx.supervisor(Shutdown::never());
        tokio::spawn(supervisor.run());
        let began = tokio::time::Instant::now();

        handle.start().await.unwrap().unwrap();
        assert_eq!(
            handle.start().await.unwrap(),
            Err(StartRejection::StartInProgress)
        );

        wait_for_state(&handle, LifecycleState::Running).await;
        // Slow power-on plus the boot grace
        assert!(began.elapsed() >= Duration::from_secs(90));
        assert_eq!(fx.cloud.power_on_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_stop() {
        let fx = Fixture::new();
        fx.probe.set_players(2);
        let (mut supervisor, handle) = fx.supervisor(Shutdown::never());
        assert!(supervisor.adopt_if_running().await);
        assert_eq!(handle.status().state, LifecycleState::Running);
        tokio::spawn(supervisor.run());

        assert_eq!(handle.stop().await.unwrap(), Ok(()));
        fx.probe.set_unreachable();
        wait_for_state(&handle, LifecycleState::Stopped).await;
        assert_eq!(fx.notifier.count_containing("stop requested"), 1);

        // Queued behind the cool-down, then rejected: nothing is running
        assert_eq!(handle.stop().await.unwrap(), Err(LifecycleState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_trigger_ends_run() {
        let fx = Fixture::new();
        let (trigger, shutdown) = Shutdown::pair();
        let (supervisor, handle) = fx.supervisor(shutdown);
        let task = tokio::spawn(supervisor.run());

        trigger.trigger();
        task.await.unwrap();

        assert!(!handle.is_alive());
        assert!(handle.start().await.is_err());
    }
}
