//! Runtime settings for survey-sync
//!
//! Layered with the `config` crate:
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config`, or `<config dir>/settings.toml`)
//! 3. Environment variables prefixed with `SURVEY_SYNC_`
//!    (e.g. `SURVEY_SYNC_ERROR_BACKOFF_MINUTES=5`)

use crate::error::{Result, SurveySyncError};
use crate::sync::SyncOptions;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "SURVEY_SYNC";

/// One week
pub const MAX_ERROR_BACKOFF_MINUTES: u64 = 7 * 24 * 60;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "survey-sync", "survey-sync")
}

/// Default location of the persisted client config
pub fn default_storage_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("config.json"))
        .unwrap_or_else(|| PathBuf::from(".survey-sync").join("config.json"))
}

/// Default location of the settings file
pub fn default_settings_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("settings.toml"))
}

/// Settings of the CLI and the sync client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Where the client config record is persisted
    pub storage_path: PathBuf,

    /// Backoff after a failed first setup
    pub error_backoff_minutes: u64,

    /// Ignore a persisted error status on setup
    pub debug: bool,

    pub request_timeout_secs: u64,

    /// TTL of the sync-surveys cache; 0 disables caching
    pub cache_ttl_secs: u64,

    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            error_backoff_minutes: 10,
            debug: false,
            request_timeout_secs: 10,
            cache_ttl_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();

        let mut builder = config::Config::builder()
            .set_default(
                "storage_path",
                defaults.storage_path.to_string_lossy().to_string(),
            )?
            .set_default("error_backoff_minutes", defaults.error_backoff_minutes as i64)?
            .set_default("debug", defaults.debug)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("cache_ttl_secs", defaults.cache_ttl_secs as i64)?
            .set_default("log_level", defaults.log_level)?;

        match path {
            Some(path) => {
                debug!("Loading settings from {}", path.display());
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default_file) = default_settings_file() {
                    builder = builder.add_source(config::File::from(default_file).required(false));
                }
            }
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.error_backoff_minutes == 0 {
            return Err(invalid("error_backoff_minutes must be greater than 0"));
        }
        if self.error_backoff_minutes > MAX_ERROR_BACKOFF_MINUTES {
            return Err(invalid(&format!(
                "error_backoff_minutes must be at most {}",
                MAX_ERROR_BACKOFF_MINUTES
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs must be greater than 0"));
        }
        if self.storage_path.as_os_str().is_empty() {
            return Err(invalid("storage_path must not be empty"));
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            error_backoff: chrono::Duration::minutes(
                self.error_backoff_minutes.min(MAX_ERROR_BACKOFF_MINUTES) as i64,
            ),
            debug: self.debug,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn invalid(message: &str) -> SurveySyncError {
    SurveySyncError::Config(config::ConfigError::Message(message.to_string()))
}
