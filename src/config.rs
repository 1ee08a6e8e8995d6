use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::db::DEFAULT_BUSY_TIMEOUT;

/// Environment variable holding the database path.
pub const DATABASE_VAR: &str = "QUIRE_DATABASE";
/// Environment variable holding the tracing filter directive.
pub const LOG_VAR: &str = "QUIRE_LOG";
/// Environment variable holding the SQLite busy timeout in milliseconds.
pub const BUSY_TIMEOUT_VAR: &str = "QUIRE_BUSY_TIMEOUT_MS";

/// Filter used when `QUIRE_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "quire=info";

/// Runtime settings for the `quire` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_filter: String,
    pub busy_timeout: Duration,
}

impl Config {
    /// Loads settings from the environment, reading a `.env` file first if
    /// one exists in the working directory or its parents.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Loads settings from the current process environment only.
    pub fn from_env() -> Result<Self> {
        let database_path = match env::var_os(DATABASE_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => default_database_path()?,
        };

        let log_filter = env::var(LOG_VAR)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let busy_timeout = match env::var(BUSY_TIMEOUT_VAR) {
            Ok(raw) => {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| {
                        format!("{BUSY_TIMEOUT_VAR} must be a number of milliseconds, got {raw:?}")
                    })?;
                Duration::from_millis(millis)
            }
            Err(_) => DEFAULT_BUSY_TIMEOUT,
        };

        Ok(Self {
            database_path,
            log_filter,
            busy_timeout,
        })
    }
}

/// Gets the cross-platform database path.
///
/// Returns the path as `{data_dir}/quire/quire.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
pub fn default_database_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("quire").join("quire.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        // SAFETY: tests touching the environment are serialized with #[serial].
        unsafe {
            env::remove_var(DATABASE_VAR);
            env::remove_var(LOG_VAR);
            env::remove_var(BUSY_TIMEOUT_VAR);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_when_unset() {
        clear_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert!(config.database_path.ends_with("quire/quire.db"));
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        clear_env();
        // SAFETY: serialized with #[serial].
        unsafe {
            env::set_var(DATABASE_VAR, "/tmp/blog.db");
            env::set_var(LOG_VAR, "quire=debug");
            env::set_var(BUSY_TIMEOUT_VAR, "250");
        }

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.database_path, PathBuf::from("/tmp/blog.db"));
        assert_eq!(config.log_filter, "quire=debug");
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn rejects_non_numeric_busy_timeout() {
        clear_env();
        // SAFETY: serialized with #[serial].
        unsafe {
            env::set_var(BUSY_TIMEOUT_VAR, "soon");
        }

        let result = Config::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains(BUSY_TIMEOUT_VAR));
    }
}
