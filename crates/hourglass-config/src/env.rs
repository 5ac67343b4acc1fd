//! Environment handling: `.env` loading and `${VAR}` references

use std::path::{Path, PathBuf};

use crate::ConfigResult;
use crate::schema::{RawConfig, RawNotifyConfig};
use crate::validation::ValidationError;

/// Load a `.env` file into the process environment.
///
/// With an explicit path the file must exist. Without one, a `.env` in the
/// current directory or its parents is loaded if present. Variables already
/// set in the environment win.
pub fn load_env_file(path: Option<&Path>) -> ConfigResult<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)?;
            Ok(Some(path.to_path_buf()))
        }
        None => Ok(dotenvy::dotenv().ok()),
    }
}

/// Replace every `${VAR}` in `input` with the value of `VAR`
pub fn resolve_env_vars(input: &str) -> Result<String, String> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(format!("unclosed variable reference in '{}'", input));
            }
            let value = std::env::var(&var_name)
                .map_err(|_| format!("environment variable {} is not set", var_name))?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve `${VAR}` references in every credential field, in place
pub(crate) fn resolve_secrets(raw: &mut RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut resolve = |field: &'static str, value: &mut String| match resolve_env_vars(value) {
        Ok(resolved) => *value = resolved,
        Err(message) => errors.push(ValidationError::UnresolvedVariable { field, message }),
    };

    resolve("cloud.api_token", &mut raw.cloud.api_token);
    resolve("cloud.droplet_id", &mut raw.cloud.droplet_id);
    match &mut raw.notify {
        RawNotifyConfig::DiscordBot { token, channel_id } => {
            resolve("notify.token", token);
            resolve("notify.channel_id", channel_id);
        }
        RawNotifyConfig::Webhook { url } => resolve("notify.url", url),
        RawNotifyConfig::Log => {}
    }

    errors
}

/// Expand a leading `~/` to the current user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        // SAFETY: test-only variable with a unique name
        unsafe { std::env::set_var("HOURGLASS_TEST_TOKEN_A", "secret") };
        assert_eq!(
            resolve_env_vars("Bearer ${HOURGLASS_TEST_TOKEN_A}").unwrap(),
            "Bearer secret"
        );
    }

    #[test]
    fn resolve_env_vars_multiple() {
        // SAFETY: test-only variables with unique names
        unsafe {
            std::env::set_var("HOURGLASS_TEST_HOST_B", "example.com");
            std::env::set_var("HOURGLASS_TEST_PATH_B", "hook");
        }
        assert_eq!(
            resolve_env_vars("https://${HOURGLASS_TEST_HOST_B}/${HOURGLASS_TEST_PATH_B}").unwrap(),
            "https://example.com/hook"
        );
    }

    #[test]
    fn resolve_env_vars_missing() {
        let err = resolve_env_vars("${HOURGLASS_TEST_DEFINITELY_UNSET}").unwrap_err();
        assert!(err.contains("HOURGLASS_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn resolve_env_vars_unclosed() {
        assert!(resolve_env_vars("${OOPS").is_err());
    }

    #[test]
    fn resolve_env_vars_no_vars() {
        assert_eq!(resolve_env_vars("plain $text").unwrap(), "plain $text");
    }

    #[test]
    fn load_env_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "HOURGLASS_TEST_FROM_FILE=loaded\n").unwrap();

        let loaded = load_env_file(Some(&path)).unwrap();
        assert_eq!(loaded.as_deref(), Some(path.as_path()));
        assert_eq!(std::env::var("HOURGLASS_TEST_FROM_FILE").unwrap(), "loaded");
    }

    #[test]
    fn load_env_file_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_file(Some(&dir.path().join("nope.env"))).is_err());
    }

    #[test]
    fn expand_home_prefix() {
        let expanded = expand_home(Path::new("~/.ssh/id_rsa"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/id_rsa"));
        }
        assert_eq!(expand_home(Path::new("/etc/key")), PathBuf::from("/etc/key"));
    }
}
