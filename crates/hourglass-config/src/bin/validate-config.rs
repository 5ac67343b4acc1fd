//! Config validation CLI tool
//!
//! Validates an hourglassd configuration file and reports any errors.

use hourglass_config::{ConfigError, NotifySettings, CURRENT_CONFIG_VERSION};
use hourglass_util::{default_config_path, weekday_symbol};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file] [env-file]");
            eprintln!();
            eprintln!("Validates an hourglassd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml .env");
            return ExitCode::from(2);
        }
    };

    // Credentials may come from a .env file
    let env_file = args.get(2).map(PathBuf::from);
    if let Err(e) = hourglass_config::load_env_file(env_file.as_deref()) {
        eprintln!("Error: {}", e);
        return ExitCode::from(1);
    }

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match hourglass_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Timezone: {}", settings.daemon.timezone);
            println!(
                "  Idle shutdown: {}s (checked every {}s)",
                settings.daemon.idle_threshold.as_secs(),
                settings.daemon.tick_interval.as_secs()
            );
            println!(
                "  Server: {}:{}",
                settings.server.address, settings.server.port
            );
            println!(
                "  Remote: {}@{}:{}",
                settings.remote.user, settings.remote.host, settings.remote.port
            );
            println!("  Droplet: {}", settings.cloud.droplet_id);
            let notify = match &settings.notify {
                NotifySettings::DiscordBot { channel_id, .. } => {
                    format!("discord bot (channel {})", channel_id)
                }
                NotifySettings::Webhook { .. } => "webhook".to_string(),
                NotifySettings::Log => "log only".to_string(),
            };
            println!("  Notifications: {}", notify);

            println!();
            println!("Allowed hours:");
            for (day, hours) in settings.schedule.iter() {
                println!("  {}: {}", weekday_symbol(day), hours);
            }
            if settings.schedule.is_empty() {
                println!();
                println!("Warning: no allowed hours on any day; starts will always be refused");
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::EnvFileError(env_err) => {
                    eprintln!("Failed to load env file: {}", env_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
