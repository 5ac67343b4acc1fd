//! Collaborator traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ExecResult, NotifyResult, PowerResult, ProbeResult};

/// Number of players connected to the game server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerCount(pub u32);

impl PlayerCount {
    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PlayerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a remote command is run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Start in the background; the session returns immediately and the
    /// remote process outlives it
    Detached,
    /// Run to completion and capture output
    Wait,
}

/// A command to run on the target host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub command: String,
    /// Run from the configured working directory
    pub use_working_dir: bool,
    pub mode: ExecMode,
}

impl RemoteCommand {
    pub fn wait(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            use_working_dir: false,
            mode: ExecMode::Wait,
        }
    }

    pub fn detached(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            use_working_dir: false,
            mode: ExecMode::Detached,
        }
    }

    pub fn in_working_dir(mut self) -> Self {
        self.use_working_dir = true;
        self
    }
}

/// Captured output of a finished remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// Combined trimmed output, stdout first
    pub fn text(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (false, false) => format!("{}\n{}", out, err),
            (false, true) => out.to_string(),
            (true, false) => err.to_string(),
            (true, true) => String::new(),
        }
    }
}

/// Power control of the compute instance hosting the game server
#[async_trait]
pub trait CloudPower: Send + Sync {
    async fn power_on(&self) -> PowerResult<()>;

    async fn power_off(&self) -> PowerResult<()>;
}

/// Command execution on the target host. Every call is its own session.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run(&self, command: &RemoteCommand) -> ExecResult<ExecOutput>;
}

/// Game-server status query
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Query the current number of connected players.
    ///
    /// A failure means "unknown", never zero players.
    async fn probe(&self) -> ProbeResult<PlayerCount>;
}

/// Chat notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> NotifyResult<()>;
}
