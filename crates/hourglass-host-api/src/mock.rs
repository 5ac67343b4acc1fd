//! Mock collaborators for testing

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    CloudPower, ExecError, ExecOutput, ExecResult, NotifyError, NotifyResult, Notifier,
    PlayerCount, PowerError, PowerResult, ProbeFailure, ProbeResult, RemoteCommand, RemoteShell,
    StatusProbe,
};

/// Status probe that replays scripted results, then falls back to a default
pub struct MockProbe {
    script: Mutex<VecDeque<ProbeResult<PlayerCount>>>,
    fallback: Mutex<ProbeResult<PlayerCount>>,
    calls: AtomicUsize,
}

impl MockProbe {
    /// Probe that answers with `players` until told otherwise
    pub fn with_players(players: u32) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(PlayerCount(players))),
            calls: AtomicUsize::new(0),
        }
    }

    /// Probe for a server that is not answering
    pub fn unreachable() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err(ProbeFailure::Unreachable("connection refused".into()))),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a one-shot result, consumed before the fallback
    pub fn push(&self, result: ProbeResult<PlayerCount>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_players(&self, players: u32) {
        *self.fallback.lock().unwrap() = Ok(PlayerCount(players));
    }

    pub fn set_unreachable(&self) {
        *self.fallback.lock().unwrap() =
            Err(ProbeFailure::Unreachable("connection refused".into()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for MockProbe {
    async fn probe(&self) -> ProbeResult<PlayerCount> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback.lock().unwrap().clone()
    }
}

/// Remote shell that records every command
pub struct MockShell {
    commands: Arc<Mutex<Vec<RemoteCommand>>>,

    /// Commands containing any of these substrings fail
    pub fail_matching: Arc<Mutex<Vec<String>>>,

    /// Output returned by successful commands
    pub output: Arc<Mutex<String>>,

    /// Simulated time each command takes
    pub run_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
            fail_matching: Arc::new(Mutex::new(Vec::new())),
            output: Arc::new(Mutex::new(String::new())),
            run_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Make commands containing `pattern` fail
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.fail_matching.lock().unwrap().push(pattern.into());
    }

    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Just the command strings, in call order
    pub fn command_lines(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.command).collect()
    }
}

impl Default for MockShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn run(&self, command: &RemoteCommand) -> ExecResult<ExecOutput> {
        self.commands.lock().unwrap().push(command.clone());

        let delay = *self.run_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fails = self
            .fail_matching
            .lock()
            .unwrap()
            .iter()
            .any(|p| command.command.contains(p.as_str()));
        if fails {
            return Err(ExecError::Failed {
                code: Some(1),
                stderr: "Mock command failure".into(),
            });
        }

        Ok(ExecOutput {
            stdout: self.output.lock().unwrap().clone(),
            stderr: String::new(),
        })
    }
}

/// Cloud power API that counts calls
pub struct MockCloud {
    power_on_calls: AtomicUsize,
    power_off_calls: AtomicUsize,

    /// Configure power-on to fail
    pub fail_power_on: Arc<Mutex<bool>>,

    /// Configure power-off to fail
    pub fail_power_off: Arc<Mutex<bool>>,

    /// Simulated API latency for power-on
    pub power_on_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            power_on_calls: AtomicUsize::new(0),
            power_off_calls: AtomicUsize::new(0),
            fail_power_on: Arc::new(Mutex::new(false)),
            fail_power_off: Arc::new(Mutex::new(false)),
            power_on_delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn power_on_calls(&self) -> usize {
        self.power_on_calls.load(Ordering::SeqCst)
    }

    pub fn power_off_calls(&self) -> usize {
        self.power_off_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudPower for MockCloud {
    async fn power_on(&self) -> PowerResult<()> {
        self.power_on_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.power_on_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_power_on.lock().unwrap() {
            return Err(PowerError::Request("Mock power-on failure".into()));
        }
        Ok(())
    }

    async fn power_off(&self) -> PowerResult<()> {
        self.power_off_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_power_off.lock().unwrap() {
            return Err(PowerError::Request("Mock power-off failure".into()));
        }
        Ok(())
    }
}

/// Notifier that keeps every message in memory
pub struct MockNotifier {
    messages: Arc<Mutex<Vec<String>>>,

    /// Configure delivery to fail (the message is still recorded)
    pub fail_send: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            fail_send: Arc::new(Mutex::new(false)),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Number of recorded messages containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, text: &str) -> NotifyResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        if *self.fail_send.lock().unwrap() {
            return Err(NotifyError::Request("Mock notify failure".into()));
        }
        Ok(())
    }
}
