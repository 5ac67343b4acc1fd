//! Integration tests for hourglassd
//!
//! These tests drive the lifecycle end to end: configuration parsing,
//! start admission, the supervisor's timer-driven monitoring and the
//! shutdown sequence, with mock collaborators standing in for the cloud,
//! the remote host and the game server.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Europe::Warsaw;
use hourglass_api::{LifecycleState, ShutdownReason, StartRejection};
use hourglass_config::{Settings, parse_config};
use hourglass_core::{
    Collaborators, ControllerSettings, CoreEvent, LifecycleController, ManualClock, Shutdown,
    StartGuard, StartReport, Supervisor, TickOutcome,
};
use hourglass_host_api::{
    ExecMode, MockCloud, MockNotifier, MockProbe, MockShell, ProbeFailure,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONFIG: &str = r#"
    config_version = 1

    [daemon]
    timezone = "Europe/Warsaw"
    tick_interval_seconds = 60
    idle_shutdown_seconds = 300
    boot_grace_seconds = 60
    cool_down_seconds = 300

    [schedule]
    mon = [14, 15, 16]

    [server]
    address = "mc.example.com"

    [remote]
    host = "203.0.113.7"
    working_dir = "/opt/minecraft"
    start_command = "java -jar server.jar nogui"

    [cloud]
    droplet_id = "123456"
    api_token = "token"
"#;

struct Harness {
    settings: Settings,
    probe: Arc<MockProbe>,
    shell: Arc<MockShell>,
    cloud: Arc<MockCloud>,
    notifier: Arc<MockNotifier>,
    clock: Arc<ManualClock>,
}

impl Harness {
    /// Server not answering, clock at `now`
    fn new(now: DateTime<chrono_tz::Tz>) -> Self {
        Self {
            settings: parse_config(CONFIG).unwrap(),
            probe: Arc::new(MockProbe::unreachable()),
            shell: Arc::new(MockShell::new()),
            cloud: Arc::new(MockCloud::new()),
            notifier: Arc::new(MockNotifier::new()),
            clock: Arc::new(ManualClock::new(now.with_timezone(&Utc))),
        }
    }

    fn controller(&self) -> (LifecycleController, mpsc::UnboundedReceiver<CoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let collaborators = Collaborators {
            cloud: self.cloud.clone(),
            shell: self.shell.clone(),
            probe: self.probe.clone(),
            notifier: self.notifier.clone(),
        };
        let settings = ControllerSettings::from_settings(&self.settings);
        let controller = LifecycleController::new(settings, collaborators)
            .with_clock(self.clock.clone())
            .with_events(tx);
        (controller, rx)
    }

    fn guard(&self) -> StartGuard {
        StartGuard::new(self.settings.daemon.boot_grace)
    }
}

// 2025-12-29 is a Monday
fn mon(hour: u32, minute: u32) -> DateTime<chrono_tz::Tz> {
    Warsaw.with_ymd_and_hms(2025, 12, 29, hour, minute, 0).unwrap()
}

/// Wait for the next `ShutdownCompleted`, skipping other events
async fn shutdown_completed(
    rx: &mut mpsc::UnboundedReceiver<CoreEvent>,
) -> (ShutdownReason, Vec<String>) {
    loop {
        match rx.recv().await {
            Some(CoreEvent::ShutdownCompleted { reason, failures }) => return (reason, failures),
            Some(_) => continue,
            None => panic!("Event channel closed before shutdown completed"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_idle_shutdown() {
    let h = Harness::new(mon(14, 0));
    let (controller, mut events) = h.controller();
    let (supervisor, handle) = Supervisor::new(
        controller,
        h.guard(),
        h.settings.daemon.cool_down,
        Shutdown::never(),
    );
    tokio::spawn(supervisor.run());

    // Down for the admission probe, then up and empty
    h.probe.push(Err(ProbeFailure::Unreachable("connection refused".into())));
    h.probe.set_players(0);

    assert_eq!(handle.start().await.unwrap(), Ok(()));

    let (reason, failures) = shutdown_completed(&mut events).await;
    assert_eq!(reason, ShutdownReason::Idle);
    assert!(failures.is_empty());

    // One admission probe plus five empty ticks
    assert_eq!(h.probe.calls(), 6);
    assert_eq!(h.cloud.power_on_calls(), 1);
    assert_eq!(h.cloud.power_off_calls(), 0);
    assert_eq!(h.notifier.count_containing("No players detected"), 1);

    let status = handle.status();
    assert_eq!(status.state, LifecycleState::Stopped);
    assert_eq!(status.idle_secs, 0);

    let commands = h.shell.commands();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0].mode, ExecMode::Detached);
    assert_eq!(commands[0].command, "java -jar server.jar nogui");
    assert_eq!(commands[1].command, h.settings.remote.stop_command);
    assert_eq!(commands[2].command, "poweroff");
}

#[tokio::test]
async fn test_end_to_end_schedule_shutdown() {
    // Only MON 16 in this scenario's schedule
    let mut h = Harness::new(mon(16, 0));
    h.settings.schedule = hourglass_util::WeeklySchedule::new().with_day(
        chrono::Weekday::Mon,
        hourglass_util::HourSet::from_hours([16]).unwrap(),
    );
    let (mut controller, mut events) = h.controller();

    let guard = StartGuard::new(Duration::ZERO);
    let report = guard
        .start(&mut controller, &mut Shutdown::never())
        .await
        .unwrap();
    assert!(matches!(report, StartReport::Started { command_ok: true, .. }));

    // Players online the whole time, so only the schedule can stop the server
    h.probe.set_players(2);

    assert_eq!(
        controller.tick(mon(16, 59)).await,
        TickOutcome::Continue { players: 2 }
    );
    assert_eq!(
        controller.tick(mon(17, 0)).await,
        TickOutcome::Continue { players: 2 }
    );
    assert_eq!(
        controller.tick(mon(17, 49)).await,
        TickOutcome::Continue { players: 2 }
    );
    assert_eq!(controller.tick(mon(17, 51)).await, TickOutcome::Warned);
    assert!(controller.warned());

    // Single-shot warning
    assert_eq!(
        controller.tick(mon(17, 52)).await,
        TickOutcome::Continue { players: 2 }
    );
    assert_eq!(h.notifier.count_containing("will shut down in 10 minutes"), 1);

    match controller.tick(mon(18, 0)).await {
        TickOutcome::ShutDown(report) => {
            assert_eq!(report.reason, ShutdownReason::Schedule);
            assert!(report.is_clean());
        }
        other => panic!("Expected schedule shutdown, got {:?}", other),
    }

    assert_eq!(controller.state(), LifecycleState::Stopped);
    assert!(!controller.warned());

    let (reason, _) = shutdown_completed(&mut events).await;
    assert_eq!(reason, ShutdownReason::Schedule);
    assert_eq!(h.notifier.count_containing("outside allowed hours"), 1);
}

#[tokio::test]
async fn test_start_rejected_when_already_running() {
    let h = Harness::new(mon(14, 30));
    h.probe.set_players(3);
    let (mut controller, _events) = h.controller();

    let result = h.guard().start(&mut controller, &mut Shutdown::never()).await;

    assert_eq!(result.err(), Some(StartRejection::AlreadyRunning));
    assert_eq!(h.cloud.power_on_calls(), 0);
    assert!(h.shell.commands().is_empty());
    assert_eq!(h.notifier.count_containing("already running"), 1);
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_start_rejected_outside_hours() {
    let mut h = Harness::new(mon(13, 59));
    h.settings.schedule = hourglass_util::WeeklySchedule::new().with_day(
        chrono::Weekday::Mon,
        hourglass_util::HourSet::from_hours([14]).unwrap(),
    );
    let (mut controller, mut events) = h.controller();

    let result = h.guard().start(&mut controller, &mut Shutdown::never()).await;

    assert_eq!(result.err(), Some(StartRejection::OutsideAllowedWindow));
    assert_eq!(h.cloud.power_on_calls(), 0);
    assert_eq!(h.notifier.count_containing("can't be started at this hour"), 1);
    assert_eq!(
        events.recv().await,
        Some(CoreEvent::StartRejected {
            reason: StartRejection::OutsideAllowedWindow
        })
    );

    // One minute later the same request is admitted
    h.clock.set(mon(14, 0).with_timezone(&Utc));
    assert!(h.guard().check(&controller).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_through_supervisor() {
    let h = Harness::new(mon(15, 0));
    let (controller, mut events) = h.controller();
    let (supervisor, handle) = Supervisor::new(
        controller,
        h.guard(),
        h.settings.daemon.cool_down,
        Shutdown::never(),
    );
    tokio::spawn(supervisor.run());

    // Stopping a stopped server is refused
    assert_eq!(handle.stop().await.unwrap(), Err(LifecycleState::Stopped));

    h.probe.push(Err(ProbeFailure::Unreachable("connection refused".into())));
    h.probe.set_players(4);
    assert_eq!(handle.start().await.unwrap(), Ok(()));

    // Wait until the boot grace has passed and monitoring began
    loop {
        match events.recv().await {
            Some(CoreEvent::ServerStarted { command_ok, .. }) => {
                assert!(command_ok);
                break;
            }
            Some(_) => continue,
            None => panic!("Event channel closed"),
        }
    }
    assert_eq!(handle.status().state, LifecycleState::Running);

    assert_eq!(handle.stop().await.unwrap(), Ok(()));
    let (reason, failures) = shutdown_completed(&mut events).await;
    assert_eq!(reason, ShutdownReason::Requested);
    assert!(failures.is_empty());
    assert_eq!(handle.status().state, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_failed_power_off_falls_back_to_cloud() {
    let h = Harness::new(mon(14, 0));
    let (mut controller, _events) = h.controller();
    let guard = StartGuard::new(Duration::ZERO);
    guard
        .start(&mut controller, &mut Shutdown::never())
        .await
        .unwrap();

    h.shell.fail_on("poweroff");
    let report = controller.request_stop().await.unwrap();

    assert!(report.is_clean());
    assert_eq!(h.cloud.power_off_calls(), 1);
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[test]
fn test_example_config_validates() {
    // SAFETY: test-only variables with unique names
    unsafe {
        std::env::set_var("DIGITALOCEAN_TOKEN", "dop_v1_example");
        std::env::set_var("DISCORD_BOT_TOKEN", "bot-token");
        std::env::set_var("DISCORD_CHANNEL_ID", "123456789012345678");
    }

    let settings = parse_config(include_str!("../../../config.example.toml")).unwrap();
    assert_eq!(settings.notify.kind(), "discord_bot");
    assert!(!settings.schedule.is_empty());
}
