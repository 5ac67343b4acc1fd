//! Remote command execution through the system `ssh` client

use async_trait::async_trait;
use hourglass_config::RemoteSettings;
use hourglass_host_api::{ExecError, ExecMode, ExecOutput, ExecResult, RemoteCommand, RemoteShell};
use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs each command in a fresh `ssh` session.
///
/// The child is killed when dropped, so a timed-out session never lingers.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    host: String,
    user: String,
    port: u16,
    key_path: Option<PathBuf>,
    working_dir: Option<String>,
    exec_timeout: Duration,
    connect_timeout: Duration,
    program: PathBuf,
}

impl SshExecutor {
    pub fn new(settings: &RemoteSettings) -> Self {
        Self {
            host: settings.host.clone(),
            user: settings.user.clone(),
            port: settings.port,
            key_path: settings.key_path.clone(),
            working_dir: settings.working_dir.clone(),
            exec_timeout: settings.exec_timeout,
            connect_timeout: settings.connect_timeout,
            program: PathBuf::from("ssh"),
        }
    }

    /// Use a different ssh client binary
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// The shell line executed on the remote host
    pub fn remote_line(&self, command: &RemoteCommand) -> String {
        let line = match command.mode {
            ExecMode::Wait => command.command.clone(),
            ExecMode::Detached => format!("nohup {} > /dev/null 2>&1 &", command.command),
        };

        match (&self.working_dir, command.use_working_dir) {
            (Some(dir), true) => {
                let dir = shell_escape::escape(Cow::from(dir.as_str()));
                format!("cd {} && {}", dir, line)
            }
            _ => line,
        }
    }

    /// Arguments passed to the ssh client
    pub fn ssh_args(&self, remote_line: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(key) = &self.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(format!("{}@{}", self.user, self.host));
        args.push("--".to_string());
        args.push(remote_line.to_string());
        args
    }
}

#[async_trait]
impl RemoteShell for SshExecutor {
    async fn run(&self, command: &RemoteCommand) -> ExecResult<ExecOutput> {
        let line = self.remote_line(command);
        debug!(host = %self.host, command = %line, "Running remote command");

        let child = Command::new(&self.program)
            .args(self.ssh_args(&line))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {}", self.program.display(), e)))?;

        let output = match tokio::time::timeout(self.exec_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecError::Spawn(e.to_string())),
            Err(_) => {
                warn!(
                    host = %self.host,
                    timeout_secs = self.exec_timeout.as_secs(),
                    "Remote command timed out"
                );
                return Err(ExecError::Timeout(self.exec_timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            debug!(host = %self.host, "Remote command succeeded");
            Ok(ExecOutput { stdout, stderr })
        } else {
            Err(ExecError::Failed {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}
