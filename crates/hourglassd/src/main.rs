//! hourglassd - the hourglass background service
//!
//! Wires together:
//! - `.env` and TOML configuration loading
//! - Production collaborators (ssh, Server List Ping, DigitalOcean, notifier)
//! - The lifecycle supervisor
//! - The IPC server

use anyhow::{Context, Result};
use clap::Parser;
use hourglass_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response, ResponsePayload,
};
use hourglass_config::{Settings, load_config, load_env_file};
use hourglass_core::{
    Announcer, Collaborators, ControllerSettings, CoreEvent, LifecycleController, Shutdown,
    ShutdownTrigger, StartGuard, Supervisor, SupervisorHandle,
};
use hourglass_ipc::{IpcServer, ServerMessage};
use hourglass_remote::{DigitalOceanPower, SlpProbe, SshExecutor, build_notifier};
use hourglass_util::{ClientId, RateLimiter, default_config_path, default_socket_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for an in-flight shutdown sequence on exit
const SUPERVISOR_EXIT_TIMEOUT: Duration = Duration::from_secs(120);

/// hourglassd - scheduled on-demand game server lifecycle
#[derive(Parser, Debug)]
#[command(name = "hourglassd")]
#[command(
    about = "Starts the game server on request and stops it when idle or out of hours",
    long_about = None
)]
struct Args {
    /// Configuration file path (default: ~/.config/hourglass/config.toml)
    #[arg(short, long, env = "HOURGLASS_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set HOURGLASS_SOCKET env var)
    #[arg(short, long, env = "HOURGLASS_SOCKET")]
    socket: Option<PathBuf>,

    /// Environment file with secrets (default: ./.env if present)
    #[arg(short, long)]
    env_file: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    settings: Settings,
    supervisor: Supervisor,
    handle: SupervisorHandle,
    trigger: ShutdownTrigger,
    core_events: mpsc::UnboundedReceiver<CoreEvent>,
    announcer: Announcer,
    ipc: Arc<IpcServer>,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        if let Some(path) = load_env_file(args.env_file.as_deref())
            .context("Failed to load environment file")?
        {
            info!(path = %path.display(), "Environment file loaded");
        }

        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            timezone = %settings.daemon.timezone,
            notify = settings.notify.kind(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .or_else(|| settings.daemon.socket_path.clone())
            .unwrap_or_else(default_socket_path);

        let notifier = build_notifier(&settings.notify).context("Failed to set up notifier")?;
        let collaborators = Collaborators {
            cloud: Arc::new(
                DigitalOceanPower::new(&settings.cloud)
                    .context("Failed to set up cloud power client")?,
            ),
            shell: Arc::new(SshExecutor::new(&settings.remote)),
            probe: Arc::new(SlpProbe::new(&settings.server)),
            notifier: notifier.clone(),
        };

        let (core_tx, core_events) = mpsc::unbounded_channel();
        let controller =
            LifecycleController::new(ControllerSettings::from_settings(&settings), collaborators)
                .with_events(core_tx);

        let (trigger, shutdown) = Shutdown::pair();
        let (supervisor, handle) = Supervisor::new(
            controller,
            StartGuard::new(settings.daemon.boot_grace),
            settings.daemon.cool_down,
            shutdown,
        );

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        // 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            settings,
            supervisor,
            handle,
            trigger,
            core_events,
            announcer: Announcer::new(notifier),
            ipc: Arc::new(ipc),
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            settings,
            mut supervisor,
            handle,
            trigger,
            mut core_events,
            announcer,
            ipc,
            rate_limiter,
        } = self;

        if supervisor.adopt_if_running().await {
            info!("Game server already running; monitoring it");
        }

        if let Some(message) = &settings.daemon.startup_message {
            announcer.notify(message).await;
        }

        let mut status_rx = handle.watch_status();
        let supervisor_task: JoinHandle<()> = tokio::spawn(supervisor.run());

        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let rate_limiter = Arc::new(Mutex::new(rate_limiter));

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                Some(event) = core_events.recv() => {
                    if let Some(payload) = event_payload(event) {
                        ipc.broadcast_event(Event::new(payload));
                    }
                }

                changed = status_rx.changed() => {
                    if changed.is_err() {
                        error!("Supervisor exited unexpectedly");
                        break;
                    }
                    let snapshot = status_rx.borrow_and_update().clone();
                    ipc.broadcast_event(Event::new(EventPayload::StateChanged(snapshot)));
                }

                Some(msg) = ipc_messages.recv() => {
                    handle_ipc_message(&handle, &ipc, &rate_limiter, msg).await;
                }
            }
        }

        info!("Shutting down hourglassd");
        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        // An in-progress shutdown sequence finishes before the supervisor exits
        trigger.trigger();
        match tokio::time::timeout(SUPERVISOR_EXIT_TIMEOUT, supervisor_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Supervisor task failed"),
            Err(_) => warn!(
                timeout_secs = SUPERVISOR_EXIT_TIMEOUT.as_secs(),
                "Supervisor did not stop in time"
            ),
        }

        ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }
}

/// IPC-visible form of a core event. `Starting` is covered by the state change.
fn event_payload(event: CoreEvent) -> Option<EventPayload> {
    Some(match event {
        CoreEvent::StartRejected { reason } => EventPayload::StartRejected { reason },
        CoreEvent::Starting => return None,
        CoreEvent::ServerStarted { command_ok, output } => {
            EventPayload::ServerStarted { command_ok, output }
        }
        CoreEvent::WarningIssued { minute_of_hour } => {
            EventPayload::WarningIssued { minute_of_hour }
        }
        CoreEvent::ProbeFailed { error } => EventPayload::ProbeFailed { error },
        CoreEvent::ShutdownStarted { reason } => EventPayload::ShutdownStarted { reason },
        CoreEvent::ShutdownCompleted { reason, failures } => {
            EventPayload::ShutdownCompleted { reason, failures }
        }
    })
}

async fn handle_ipc_message(
    handle: &SupervisorHandle,
    ipc: &Arc<IpcServer>,
    rate_limiter: &Arc<Mutex<RateLimiter>>,
    msg: ServerMessage,
) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            {
                let mut limiter = rate_limiter.lock().await;
                if !limiter.check(&client_id) {
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    );
                    let _ = ipc.send_response(&client_id, response).await;
                    return;
                }
            }

            debug!(client_id = %client_id, command = ?request.command, "Request");

            match request.command {
                // May wait behind a boot or cool-down; answer from a task
                Command::Start | Command::Stop => {
                    let handle = handle.clone();
                    let ipc = ipc.clone();
                    tokio::spawn(async move {
                        let response =
                            lifecycle_command(&handle, request.request_id, request.command).await;
                        let _ = ipc.send_response(&client_id, response).await;
                    });
                }
                command => {
                    let subscribed = matches!(command, Command::SubscribeEvents);
                    let response = handle_command(handle, &client_id, request.request_id, command);
                    let _ = ipc.send_response(&client_id, response).await;

                    // New subscribers start from the current status
                    if subscribed {
                        ipc.broadcast_event(Event::new(EventPayload::StateChanged(
                            handle.status(),
                        )));
                    }
                }
            }
        }

        ServerMessage::ClientConnected { client_id, info } => {
            debug!(
                client_id = %client_id,
                uid = ?info.uid,
                process = ?info.process_name,
                "Client registered"
            );
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Client disconnected");
            rate_limiter.lock().await.remove_client(&client_id);
        }
    }
}

async fn lifecycle_command(
    handle: &SupervisorHandle,
    request_id: u64,
    command: Command,
) -> Response {
    let payload = match command {
        Command::Start => handle.start().await.map(|result| match result {
            Ok(()) => ResponsePayload::StartAccepted,
            Err(reason) => ResponsePayload::StartRejected { reason },
        }),
        Command::Stop => handle.stop().await.map(|result| match result {
            Ok(()) => ResponsePayload::StopAccepted,
            Err(state) => ResponsePayload::StopRejected { state },
        }),
        other => {
            return Response::error(
                request_id,
                ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    format!("{:?} is not a lifecycle command", other),
                ),
            );
        }
    };

    match payload {
        Ok(payload) => Response::success(request_id, payload),
        Err(e) => Response::error(
            request_id,
            ErrorInfo::new(ErrorCode::Unavailable, e.to_string()),
        ),
    }
}

fn handle_command(
    handle: &SupervisorHandle,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> Response {
    match command {
        Command::GetStatus => {
            Response::success(request_id, ResponsePayload::Status(handle.status()))
        }

        Command::SubscribeEvents => Response::success(
            request_id,
            ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            },
        ),

        Command::UnsubscribeEvents => Response::success(request_id, ResponsePayload::Unsubscribed),

        Command::GetHealth => {
            let supervisor_ok = handle.is_alive();
            Response::success(
                request_id,
                ResponsePayload::Health(HealthStatus {
                    live: true,
                    ready: supervisor_ok,
                    config_loaded: true,
                    supervisor_ok,
                }),
            )
        }

        Command::Ping => Response::success(request_id, ResponsePayload::Pong),

        Command::Start | Command::Stop => Response::error(
            request_id,
            ErrorInfo::new(ErrorCode::InternalError, "Lifecycle command routed inline"),
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hourglassd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
