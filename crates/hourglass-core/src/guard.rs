//! Start guard: admission checks and the power-on sequence

use hourglass_api::{LifecycleState, StartRejection};
use std::time::Duration;
use tracing::{info, warn};

use hourglass_host_api::RemoteCommand;

use crate::{CoreEvent, LifecycleController, Shutdown, evaluate};

/// Outcome of a start sequence that passed admission
#[derive(Debug, Clone, PartialEq)]
pub enum StartReport {
    /// Instance powered on and the start command was issued
    Started {
        command_ok: bool,
        output: String,
    },
    /// Shutdown interrupted the boot grace period; nothing was started remotely
    Cancelled,
}

pub fn rejection_message(reason: StartRejection) -> &'static str {
    match reason {
        StartRejection::AlreadyRunning => "⛔ Server is already running.",
        StartRejection::StartInProgress => "⏳ Server is already starting.",
        StartRejection::OutsideAllowedWindow => "⛔ Server can't be started at this hour.",
    }
}

/// Admission control and start sequence for a stopped server
#[derive(Debug, Clone)]
pub struct StartGuard {
    boot_grace: Duration,
}

impl StartGuard {
    pub fn new(boot_grace: Duration) -> Self {
        Self { boot_grace }
    }

    pub fn boot_grace(&self) -> Duration {
        self.boot_grace
    }

    /// Decide whether a start may proceed. Every rejection is announced once.
    pub async fn check(&self, controller: &LifecycleController) -> Result<(), StartRejection> {
        let result = self.admit(controller).await;
        if let Err(reason) = result {
            info!(%reason, "Start rejected");
            let announcer = controller.announcer();
            announcer.notify(rejection_message(reason)).await;
            announcer.emit(CoreEvent::StartRejected { reason });
        }
        result
    }

    async fn admit(&self, controller: &LifecycleController) -> Result<(), StartRejection> {
        match controller.state() {
            LifecycleState::Stopped => {}
            LifecycleState::Starting => return Err(StartRejection::StartInProgress),
            LifecycleState::Running | LifecycleState::ShuttingDown => {
                return Err(StartRejection::AlreadyRunning);
            }
        }

        // A server that answers is already up, whatever our state says
        if let Ok(players) = controller.collaborators().probe.probe().await {
            info!(players = players.get(), "Server answered status probe");
            return Err(StartRejection::AlreadyRunning);
        }

        let now = controller.local_now();
        if !evaluate(&controller.settings().schedule, &now).within_window {
            return Err(StartRejection::OutsideAllowedWindow);
        }

        Ok(())
    }

    /// Power on, wait for boot, issue the start command and hand over to
    /// the controller. Call only after [`check`](Self::check) succeeded.
    pub async fn launch(
        &self,
        controller: &mut LifecycleController,
        shutdown: &mut Shutdown,
    ) -> StartReport {
        controller.mark_starting();
        let announcer = controller.announcer().clone();
        let collaborators = controller.collaborators().clone();

        announcer.emit(CoreEvent::Starting);
        announcer.notify("🟢 Starting server...").await;

        info!("Powering on instance");
        let power_error = match collaborators.cloud.power_on().await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Power-on request failed");
                Some(e)
            }
        };

        info!(grace_secs = self.boot_grace.as_secs(), "Waiting for instance to boot");
        if !shutdown.sleep(self.boot_grace).await {
            warn!("Boot wait interrupted by shutdown; instance may be left powered on");
            return StartReport::Cancelled;
        }

        let start = RemoteCommand::detached(controller.settings().start_command.clone())
            .in_working_dir();
        let result = collaborators.shell.run(&start).await;

        // Fail forward: the instance is on either way, so monitoring begins
        controller.mark_running();

        let (command_ok, output) = match result {
            Ok(out) => {
                info!("Start command issued");
                let text = out.text();
                let text = if text.is_empty() {
                    "Server is starting in the background.".to_string()
                } else {
                    text
                };
                (true, text)
            }
            Err(e) => {
                warn!(error = %e, "Start command failed");
                (false, e.to_string())
            }
        };

        let mut message = if command_ok {
            format!("✅ Server started.\n```\n{}\n```", output)
        } else {
            format!("⚠️ Instance is on but the start command failed.\n```\n{}\n```", output)
        };
        if let Some(e) = power_error {
            message.push_str(&format!("\n⚠️ Power-on request failed: {}", e));
        }
        announcer.notify(&message).await;
        announcer.emit(CoreEvent::ServerStarted {
            command_ok,
            output: output.clone(),
        });

        StartReport::Started { command_ok, output }
    }

    /// [`check`](Self::check) followed by [`launch`](Self::launch)
    pub async fn start(
        &self,
        controller: &mut LifecycleController,
        shutdown: &mut Shutdown,
    ) -> Result<StartReport, StartRejection> {
        self.check(controller).await?;
        Ok(self.launch(controller, shutdown).await)
    }
}
