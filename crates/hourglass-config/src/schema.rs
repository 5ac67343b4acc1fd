//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global daemon settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Allowed hours per weekday
    #[serde(default)]
    pub schedule: RawSchedule,

    /// Game server status query
    pub server: RawServerConfig,

    /// ssh access to the instance
    pub remote: RawRemoteConfig,

    /// Cloud power API
    pub cloud: RawCloudConfig,

    /// Notification channel
    #[serde(default)]
    pub notify: RawNotifyConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/hourglass/hourglassd.sock)
    pub socket_path: Option<PathBuf>,

    /// IANA timezone the schedule is written in (default: UTC)
    pub timezone: Option<String>,

    /// Seconds between status probes while running (default: 60)
    pub tick_interval_seconds: Option<u64>,

    /// Zero-player time before shutting down (default: 300)
    pub idle_shutdown_seconds: Option<u64>,

    /// Wait between power-on and the start command (default: 60)
    pub boot_grace_seconds: Option<u64>,

    /// Quiet period after a shutdown (default: 300)
    pub cool_down_seconds: Option<u64>,

    /// Minute of the hour at which the end-of-window warning is sent (default: 50)
    pub warning_minute: Option<u32>,

    /// Send a notification when the daemon comes online (default: true)
    pub announce_startup: Option<bool>,

    /// Text of the startup notification
    pub startup_message: Option<String>,
}

/// Allowed hours for one day: `[18, 19, 20]` or `"18,19,20"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawHours {
    List(Vec<i64>),
    Csv(String),
}

/// Per-weekday allowed hours. Missing days allow nothing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedule {
    #[serde(alias = "monday")]
    pub mon: Option<RawHours>,
    #[serde(alias = "tuesday")]
    pub tue: Option<RawHours>,
    #[serde(alias = "wednesday")]
    pub wed: Option<RawHours>,
    #[serde(alias = "thursday")]
    pub thu: Option<RawHours>,
    #[serde(alias = "friday")]
    pub fri: Option<RawHours>,
    #[serde(alias = "saturday")]
    pub sat: Option<RawHours>,
    #[serde(alias = "sunday")]
    pub sun: Option<RawHours>,
}

impl RawSchedule {
    /// Days in Monday-first order with their symbols
    pub fn days(&self) -> [(&'static str, Option<&RawHours>); 7] {
        [
            ("mon", self.mon.as_ref()),
            ("tue", self.tue.as_ref()),
            ("wed", self.wed.as_ref()),
            ("thu", self.thu.as_ref()),
            ("fri", self.fri.as_ref()),
            ("sat", self.sat.as_ref()),
            ("sun", self.sun.as_ref()),
        ]
    }
}

/// Game server query endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawServerConfig {
    /// Hostname or IP the game server listens on
    pub address: String,

    /// Query port (default: 25565)
    pub port: Option<u16>,

    /// Connect + read timeout for one status query (default: 5)
    pub probe_timeout_seconds: Option<u64>,
}

/// ssh target and the commands run on it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRemoteConfig {
    pub host: String,

    /// Login user (default: root)
    pub user: Option<String>,

    /// ssh port (default: 22)
    pub port: Option<u16>,

    /// Private key; `~/` is expanded
    pub key_path: Option<PathBuf>,

    /// Directory the game server lives in on the remote host
    pub working_dir: Option<String>,

    /// Starts the game server (run detached from `working_dir`)
    pub start_command: String,

    /// Stops the game server gracefully (run from `working_dir`)
    pub stop_command: Option<String>,

    /// Powers off the host (default: poweroff)
    pub power_off_command: Option<String>,

    /// Upper bound for one remote command, session setup included (default: 10)
    pub exec_timeout_seconds: Option<u64>,

    /// ssh ConnectTimeout (default: 5)
    pub connect_timeout_seconds: Option<u64>,
}

/// Cloud provider settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawCloudConfig {
    /// Only "digitalocean" is supported
    #[serde(default = "default_provider")]
    pub provider: String,

    pub droplet_id: String,

    /// May reference environment variables: `${DO_API_TOKEN}`
    pub api_token: String,

    /// Override of the API base URL
    pub api_url: Option<String>,

    /// HTTP request timeout (default: 30)
    pub request_timeout_seconds: Option<u64>,
}

fn default_provider() -> String {
    "digitalocean".into()
}

/// Notification channel
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawNotifyConfig {
    /// Post as a Discord bot into one channel
    DiscordBot { token: String, channel_id: String },

    /// POST `{"content": "..."}` to a URL (Discord/Slack-compatible webhooks)
    Webhook { url: String },

    /// Only write notifications to the log
    #[default]
    Log,
}
