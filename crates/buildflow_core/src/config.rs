//! Application configuration and user notification preferences.
//!
//! # Responsibility
//! - Load the JSON configuration file used by the CLI runtime.
//! - Define the persisted notification preferences toggled by users.
//!
//! # Invariants
//! - Every configuration field has a default; an absent file is valid.
//! - `tick_period_secs` is never zero and thresholds never exceed 100.

use crate::reminder::evaluator::EvaluatorSettings;
use crate::reminder::scheduler::DEFAULT_TICK_PERIOD;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Notifications kept in the inbox when auto-delete is on.
pub const INBOX_RETENTION: u32 = 50;

const DEFAULT_DATABASE_FILE: &str = "buildflow.sqlite3";

/// User-facing notification preferences.
///
/// Persisted in the `settings` table so a toggle takes effect at the next
/// scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Master switch for reminder evaluation and inbox pushes.
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
    pub toasts_enabled: bool,
    pub browser_notifications: bool,
    /// Keep only the newest `INBOX_RETENTION` notifications.
    pub auto_delete: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            sound_enabled: true,
            toasts_enabled: true,
            browser_notifications: false,
            auto_delete: true,
        }
    }
}

/// Partial change to `NotificationSettings`; `None` keeps the stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationSettingsPatch {
    pub notifications_enabled: Option<bool>,
    pub sound_enabled: Option<bool>,
    pub toasts_enabled: Option<bool>,
    pub browser_notifications: Option<bool>,
    pub auto_delete: Option<bool>,
}

impl NotificationSettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, settings: NotificationSettings) -> NotificationSettings {
        NotificationSettings {
            notifications_enabled: self
                .notifications_enabled
                .unwrap_or(settings.notifications_enabled),
            sound_enabled: self.sound_enabled.unwrap_or(settings.sound_enabled),
            toasts_enabled: self.toasts_enabled.unwrap_or(settings.toasts_enabled),
            browser_notifications: self
                .browser_notifications
                .unwrap_or(settings.browser_notifications),
            auto_delete: self.auto_delete.unwrap_or(settings.auto_delete),
        }
    }
}

/// Runtime configuration for the CLI and reminder service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    /// Absolute directory for rolling log files. Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub tick_period_secs: u64,
    /// Drop ledger records of entities deleted from the stores.
    pub prune_deleted_entities: bool,
    /// Rule tunables. `notifications_enabled` here is a hard off switch that
    /// wins over the persisted user preference.
    pub evaluator: EvaluatorSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            tick_period_secs: DEFAULT_TICK_PERIOD.as_secs(),
            prune_deleted_entities: true,
            evaluator: EvaluatorSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_period_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "tick_period_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(threshold) = self.evaluator.thresholds.iter().find(|t| **t > 100) {
            return Err(ConfigError::Invalid(format!(
                "threshold {threshold} is outside 0..=100"
            )));
        }
        if self.evaluator.expiry_window_days < 0 {
            return Err(ConfigError::Invalid(
                "expiry_window_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Loads configuration from `path`, or defaults when `path` is `None`.
///
/// # Errors
/// - `Io` / `Parse` when the file cannot be read or decoded.
/// - `Invalid` when values break configuration invariants.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let config = match path {
        None => AppConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        }
    };
    config.validate()?;
    Ok(config)
}
