//! Validated settings structures

use chrono_tz::Tz;
use hourglass_util::{WeeklySchedule, parse_weekday};
use std::path::PathBuf;
use std::time::Duration;

use crate::env::expand_home;
use crate::schema::{
    RawCloudConfig, RawConfig, RawDaemonConfig, RawNotifyConfig, RawRemoteConfig, RawServerConfig,
};
use crate::validation::{parse_hours, parse_timezone};

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_IDLE_SHUTDOWN_SECS: u64 = 300;
pub const DEFAULT_BOOT_GRACE_SECS: u64 = 60;
pub const DEFAULT_COOL_DOWN_SECS: u64 = 300;
pub const DEFAULT_WARNING_MINUTE: u32 = 50;
pub const DEFAULT_QUERY_PORT: u16 = 25565;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_STOP_COMMAND: &str = "screen -S mc -X stuff 'stop\\n'";
pub const DEFAULT_POWER_OFF_COMMAND: &str = "poweroff";
pub const DEFAULT_STARTUP_MESSAGE: &str = "🟢 Hourglass is online.";
pub const DIGITALOCEAN_API_URL: &str = "https://api.digitalocean.com/v2";

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub schedule: WeeklySchedule,
    pub server: ServerSettings,
    pub remote: RemoteSettings,
    pub cloud: CloudSettings,
    pub notify: NotifySettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let mut schedule = WeeklySchedule::new();
        for (day, hours) in raw.schedule.days() {
            if let (Some(weekday), Some(hours)) = (parse_weekday(day), hours)
                && let Ok(set) = parse_hours(hours)
            {
                schedule.set_day(weekday, set);
            }
        }

        Self {
            daemon: DaemonSettings::from_raw(raw.daemon),
            schedule,
            server: ServerSettings::from_raw(raw.server),
            remote: RemoteSettings::from_raw(raw.remote),
            cloud: CloudSettings::from_raw(raw.cloud),
            notify: NotifySettings::from_raw(raw.notify),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    /// Explicit socket path; None means the platform default
    pub socket_path: Option<PathBuf>,
    pub timezone: Tz,
    pub tick_interval: Duration,
    pub idle_threshold: Duration,
    pub boot_grace: Duration,
    pub cool_down: Duration,
    pub warning_minute: u32,
    /// Startup notification text, None when disabled
    pub startup_message: Option<String>,
}

impl DaemonSettings {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        let timezone = raw
            .timezone
            .as_deref()
            .and_then(|tz| parse_timezone(tz).ok())
            .unwrap_or(Tz::UTC);

        let startup_message = if raw.announce_startup.unwrap_or(true) {
            Some(
                raw.startup_message
                    .unwrap_or_else(|| DEFAULT_STARTUP_MESSAGE.to_string()),
            )
        } else {
            None
        };

        Self {
            socket_path: raw.socket_path,
            timezone,
            tick_interval: secs(raw.tick_interval_seconds, DEFAULT_TICK_INTERVAL_SECS),
            idle_threshold: secs(raw.idle_shutdown_seconds, DEFAULT_IDLE_SHUTDOWN_SECS),
            boot_grace: secs(raw.boot_grace_seconds, DEFAULT_BOOT_GRACE_SECS),
            cool_down: secs(raw.cool_down_seconds, DEFAULT_COOL_DOWN_SECS),
            warning_minute: raw.warning_minute.unwrap_or(DEFAULT_WARNING_MINUTE),
            startup_message,
        }
    }
}

/// Game server status query settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub address: String,
    pub port: u16,
    pub probe_timeout: Duration,
}

impl ServerSettings {
    fn from_raw(raw: RawServerConfig) -> Self {
        Self {
            address: raw.address.trim().to_string(),
            port: raw.port.unwrap_or(DEFAULT_QUERY_PORT),
            probe_timeout: secs(raw.probe_timeout_seconds, DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }
}

/// ssh target and lifecycle commands
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub key_path: Option<PathBuf>,
    pub working_dir: Option<String>,
    pub start_command: String,
    pub stop_command: String,
    pub power_off_command: String,
    pub exec_timeout: Duration,
    pub connect_timeout: Duration,
}

impl RemoteSettings {
    fn from_raw(raw: RawRemoteConfig) -> Self {
        Self {
            host: raw.host.trim().to_string(),
            user: raw.user.unwrap_or_else(|| "root".into()),
            port: raw.port.unwrap_or(22),
            key_path: raw.key_path.as_deref().map(expand_home),
            working_dir: raw.working_dir.filter(|d| !d.trim().is_empty()),
            start_command: raw.start_command,
            stop_command: raw
                .stop_command
                .unwrap_or_else(|| DEFAULT_STOP_COMMAND.into()),
            power_off_command: raw
                .power_off_command
                .unwrap_or_else(|| DEFAULT_POWER_OFF_COMMAND.into()),
            exec_timeout: secs(raw.exec_timeout_seconds, DEFAULT_EXEC_TIMEOUT_SECS),
            connect_timeout: secs(raw.connect_timeout_seconds, DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// DigitalOcean droplet settings
#[derive(Clone)]
pub struct CloudSettings {
    pub droplet_id: String,
    pub api_token: String,
    pub api_url: String,
    pub request_timeout: Duration,
}

impl CloudSettings {
    fn from_raw(raw: RawCloudConfig) -> Self {
        Self {
            droplet_id: raw.droplet_id.trim().to_string(),
            api_token: raw.api_token,
            api_url: raw
                .api_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DIGITALOCEAN_API_URL.into()),
            request_timeout: secs(raw.request_timeout_seconds, 30),
        }
    }
}

// Keep the token out of logs
impl std::fmt::Debug for CloudSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSettings")
            .field("droplet_id", &self.droplet_id)
            .field("api_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Where notifications go
#[derive(Clone)]
pub enum NotifySettings {
    DiscordBot { token: String, channel_id: u64 },
    Webhook { url: String },
    Log,
}

impl NotifySettings {
    fn from_raw(raw: RawNotifyConfig) -> Self {
        match raw {
            RawNotifyConfig::DiscordBot { token, channel_id } => {
                match channel_id.trim().parse() {
                    Ok(channel_id) => NotifySettings::DiscordBot { token, channel_id },
                    Err(_) => NotifySettings::Log,
                }
            }
            RawNotifyConfig::Webhook { url } => NotifySettings::Webhook { url },
            RawNotifyConfig::Log => NotifySettings::Log,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotifySettings::DiscordBot { .. } => "discord_bot",
            NotifySettings::Webhook { .. } => "webhook",
            NotifySettings::Log => "log",
        }
    }
}

impl std::fmt::Debug for NotifySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifySettings::DiscordBot { channel_id, .. } => f
                .debug_struct("DiscordBot")
                .field("channel_id", channel_id)
                .finish_non_exhaustive(),
            NotifySettings::Webhook { .. } => f.debug_struct("Webhook").finish_non_exhaustive(),
            NotifySettings::Log => write!(f, "Log"),
        }
    }
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}
