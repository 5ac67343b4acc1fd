//! Default paths for hourglass components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/hourglass/hourglassd.sock` or `/tmp/hourglass-$USER/hourglassd.sock`
//! - Config: `$XDG_CONFIG_HOME/hourglass/config.toml` or `~/.config/hourglass/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const HOURGLASS_SOCKET_ENV: &str = "HOURGLASS_SOCKET";

/// Environment variable for overriding the config file path
pub const HOURGLASS_CONFIG_ENV: &str = "HOURGLASS_CONFIG";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "hourglassd.sock";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "hourglass";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$HOURGLASS_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/hourglass/hourglassd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/hourglass-$USER/hourglassd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(HOURGLASS_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the HOURGLASS_SOCKET env var.
/// Used for config defaults where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$HOURGLASS_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/hourglass/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/hourglass/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(HOURGLASS_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}
