//! hourglass-ctl - command-line client for hourglassd

mod format;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hourglass_api::{Command, ResponsePayload, ResponseResult};
use hourglass_ipc::{IpcClient, IpcError};
use hourglass_util::default_socket_path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Timeout for requests the daemon answers immediately
const QUICK_TIMEOUT: Duration = Duration::from_secs(10);

/// hourglass-ctl - control the hourglass game server daemon
#[derive(Parser, Debug)]
#[command(name = "hourglass-ctl")]
#[command(
    about = "Start, stop and inspect the game server managed by hourglassd",
    long_about = None
)]
struct Args {
    /// Socket path for hourglassd connection (or set HOURGLASS_SOCKET env var)
    #[arg(short, long, env = "HOURGLASS_SOCKET")]
    socket: Option<PathBuf>,

    /// Print raw JSON instead of text
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: CtlCommand,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum CtlCommand {
    /// Power on and start the server, if allowed right now
    Start,
    /// Shut the server down now
    Stop,
    /// Show the current lifecycle status
    Status,
    /// Stream lifecycle events until interrupted
    Watch,
    /// Show daemon health
    Health,
    /// Check that the daemon answers
    Ping,
}

impl CtlCommand {
    fn request(self) -> Command {
        match self {
            CtlCommand::Start => Command::Start,
            CtlCommand::Stop => Command::Stop,
            CtlCommand::Status => Command::GetStatus,
            CtlCommand::Watch => Command::SubscribeEvents,
            CtlCommand::Health => Command::GetHealth,
            CtlCommand::Ping => Command::Ping,
        }
    }

    /// Start and stop may queue behind a boot or a cool-down
    fn timeout(self) -> Option<Duration> {
        match self {
            CtlCommand::Start | CtlCommand::Stop => None,
            _ => Some(QUICK_TIMEOUT),
        }
    }
}

/// Whether a successful response still means "didn't happen"
fn is_rejection(payload: &ResponsePayload) -> bool {
    matches!(
        payload,
        ResponsePayload::StartRejected { .. } | ResponsePayload::StopRejected { .. }
    )
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut events = client.subscribe().await.context("Failed to subscribe")?;
    loop {
        match events.next().await {
            Ok(event) => {
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!("{}", format::event(&event));
                }
                if matches!(event.payload, hourglass_api::EventPayload::Shutdown) {
                    return Ok(());
                }
            }
            Err(IpcError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e).context("Event stream failed"),
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let socket_path = args.socket.unwrap_or_else(default_socket_path);
    tracing::debug!(path = %socket_path.display(), "Connecting to hourglassd");

    let mut client = IpcClient::connect(&socket_path)
        .await
        .with_context(|| format!("Failed to connect to hourglassd at {}", socket_path.display()))?;
    if let Some(timeout) = args.command.timeout() {
        client = client.with_timeout(timeout);
    }

    if args.command == CtlCommand::Watch {
        watch(client, args.json).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let response = client.send(args.command.request()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    match response.result {
        ResponseResult::Ok(payload) => {
            if !args.json {
                println!("{}", format::payload(&payload));
            }
            if is_rejection(&payload) {
                Ok(ExitCode::from(1))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        ResponseResult::Err(e) => {
            if args.json {
                return Ok(ExitCode::from(2));
            }
            bail!("hourglassd error ({:?}): {}", e.code, e.message)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}
