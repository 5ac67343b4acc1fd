//! Configuration validation

use crate::schema::{RawConfig, RawHours, RawNotifyConfig};
use chrono_tz::Tz;
use hourglass_util::HourSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Schedule for '{day}': {message}")]
    InvalidHours { day: &'static str, message: String },

    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("daemon.tick_interval_seconds {0} must be less than one hour")]
    TickTooLong(u64),

    #[error("warning_minute {0} must be between 0 and 59")]
    InvalidWarningMinute(u32),

    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },

    #[error("Unsupported cloud provider '{0}' (expected \"digitalocean\")")]
    UnsupportedProvider(String),

    #[error("{field}: {message}")]
    UnresolvedVariable { field: &'static str, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_daemon(config));

    for (day, hours) in config.schedule.days() {
        if let Some(hours) = hours
            && let Err(message) = parse_hours(hours)
        {
            errors.push(ValidationError::InvalidHours { day, message });
        }
    }

    if config.server.address.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            field: "server.address",
        });
    }
    if config.server.probe_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroDuration {
            field: "server.probe_timeout_seconds",
        });
    }

    let remote = &config.remote;
    if remote.host.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            field: "remote.host",
        });
    }
    if remote.start_command.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            field: "remote.start_command",
        });
    }
    if remote.exec_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroDuration {
            field: "remote.exec_timeout_seconds",
        });
    }
    if remote.connect_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroDuration {
            field: "remote.connect_timeout_seconds",
        });
    }

    let cloud = &config.cloud;
    if !cloud.provider.eq_ignore_ascii_case("digitalocean") {
        errors.push(ValidationError::UnsupportedProvider(cloud.provider.clone()));
    }
    if cloud.droplet_id.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            field: "cloud.droplet_id",
        });
    }
    if cloud.api_token.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            field: "cloud.api_token",
        });
    }

    match &config.notify {
        RawNotifyConfig::DiscordBot { token, channel_id } => {
            if token.trim().is_empty() {
                errors.push(ValidationError::EmptyField {
                    field: "notify.token",
                });
            }
            if channel_id.trim().parse::<u64>().is_err() {
                errors.push(ValidationError::GlobalError(format!(
                    "notify.channel_id '{}' is not a numeric channel id",
                    channel_id
                )));
            }
        }
        RawNotifyConfig::Webhook { url } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError::GlobalError(format!(
                    "notify.url '{}' must be an http(s) URL",
                    url
                )));
            }
        }
        RawNotifyConfig::Log => {}
    }

    errors
}

fn validate_daemon(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let daemon = &config.daemon;

    if let Some(tz) = &daemon.timezone
        && parse_timezone(tz).is_err()
    {
        errors.push(ValidationError::InvalidTimezone(tz.clone()));
    }

    let positive = [
        ("daemon.tick_interval_seconds", daemon.tick_interval_seconds),
        ("daemon.idle_shutdown_seconds", daemon.idle_shutdown_seconds),
    ];
    for (field, value) in positive {
        if value == Some(0) {
            errors.push(ValidationError::ZeroDuration { field });
        }
    }

    if let Some(secs) = daemon.tick_interval_seconds
        && secs >= 3600
    {
        errors.push(ValidationError::TickTooLong(secs));
    }

    if let Some(minute) = daemon.warning_minute
        && minute >= 60
    {
        errors.push(ValidationError::InvalidWarningMinute(minute));
    }

    errors
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz, String> {
    name.trim().parse::<Tz>().map_err(|e| e.to_string())
}

/// Parse one day's allowed hours
pub fn parse_hours(hours: &RawHours) -> Result<HourSet, String> {
    let values: Vec<i64> = match hours {
        RawHours::List(list) => list.clone(),
        RawHours::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>().map_err(|_| format!("'{}' is not an hour", s)))
            .collect::<Result<_, _>>()?,
    };

    let mut set = HourSet::new();
    for value in values {
        if !(0..24).contains(&value) {
            return Err(format!("hour {} out of range 0-23", value));
        }
        set.insert(value as u8);
    }
    Ok(set)
}
