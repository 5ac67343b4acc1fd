//! Configuration parsing and validation for hourglassd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Per-weekday allowed hours in a named timezone
//! - Server query, ssh, cloud and notification sections
//! - `.env` loading and `${VAR}` references for credentials
//! - Validation with clear error messages

mod env;
mod schema;
mod settings;
mod validation;

pub use env::*;
pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to load env file: {0}")]
    EnvFileError(#[from] dotenvy::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let mut raw: RawConfig = toml::from_str(content)?;

    // Check version
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let mut errors = resolve_secrets(&mut raw);
    errors.extend(validate_config(&raw));
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use std::time::Duration;

    const MINIMAL: &str = r#"
        config_version = 1

        [server]
        address = "mc.example.com"

        [remote]
        host = "203.0.113.7"
        start_command = "./start.sh"

        [cloud]
        droplet_id = "123456"
        api_token = "plain-token"
    "#;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config(MINIMAL).unwrap();

        assert_eq!(settings.daemon.timezone, chrono_tz::Tz::UTC);
        assert_eq!(settings.daemon.tick_interval, Duration::from_secs(60));
        assert_eq!(settings.daemon.idle_threshold, Duration::from_secs(300));
        assert_eq!(settings.daemon.warning_minute, 50);
        assert_eq!(
            settings.daemon.startup_message.as_deref(),
            Some(DEFAULT_STARTUP_MESSAGE)
        );
        assert!(settings.schedule.is_empty());
        assert_eq!(settings.server.port, 25565);
        assert_eq!(settings.remote.user, "root");
        assert_eq!(settings.remote.stop_command, DEFAULT_STOP_COMMAND);
        assert_eq!(settings.remote.power_off_command, "poweroff");
        assert_eq!(settings.cloud.api_url, DIGITALOCEAN_API_URL);
        assert!(matches!(settings.notify, NotifySettings::Log));
    }

    #[test]
    fn parse_full_config() {
        // SAFETY: test-only variable with a unique name
        unsafe { std::env::set_var("HOURGLASS_TEST_DISCORD_TOKEN", "bot-token") };

        let config = r#"
            config_version = 1

            [daemon]
            timezone = "Europe/Warsaw"
            tick_interval_seconds = 30
            idle_shutdown_seconds = 600
            announce_startup = false

            [schedule]
            mon = [14, 15, 16]
            friday = "18,19,20,21"
            sun = []

            [server]
            address = "mc.example.com"
            port = 25566

            [remote]
            host = "203.0.113.7"
            user = "minecraft"
            key_path = "/etc/hourglass/id_ed25519"
            working_dir = "/opt/minecraft"
            start_command = "java -jar fabric-server-launch.jar nogui"

            [cloud]
            droplet_id = "123456"
            api_token = "plain"

            [notify]
            type = "discord_bot"
            token = "${HOURGLASS_TEST_DISCORD_TOKEN}"
            channel_id = "987654321"
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.daemon.timezone, chrono_tz::Europe::Warsaw);
        assert_eq!(settings.daemon.tick_interval, Duration::from_secs(30));
        assert!(settings.daemon.startup_message.is_none());
        assert!(settings.schedule.allows(Weekday::Mon, 15));
        assert!(settings.schedule.allows(Weekday::Fri, 21));
        assert!(!settings.schedule.allows(Weekday::Sun, 15));
        assert_eq!(settings.remote.working_dir.as_deref(), Some("/opt/minecraft"));

        match settings.notify {
            NotifySettings::DiscordBot { token, channel_id } => {
                assert_eq!(token, "bot-token");
                assert_eq!(channel_id, 987654321);
            }
            other => panic!("Unexpected notify settings: {:?}", other),
        }
    }

    #[test]
    fn reject_wrong_version() {
        let config = MINIMAL.replace("config_version = 1", "config_version = 99");
        let result = parse_config(&config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_unresolved_variable() {
        let config = MINIMAL.replace("plain-token", "${HOURGLASS_TEST_NEVER_SET_TOKEN}");
        match parse_config(&config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::UnresolvedVariable { .. })));
            }
            other => panic!("Expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn reject_missing_section() {
        let config = r#"
            config_version = 1

            [server]
            address = "mc.example.com"
        "#;
        assert!(matches!(parse_config(config), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let settings = load_config(&path).unwrap();
        assert_eq!(settings.server.address, "mc.example.com");

        assert!(matches!(
            load_config(dir.path().join("missing.toml")),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    fn cloud_settings_debug_redacts_token() {
        let settings = parse_config(MINIMAL).unwrap();
        let debug = format!("{:?}", settings.cloud);
        assert!(!debug.contains("plain-token"));
        assert!(debug.contains("redacted"));
    }
}
