mod file_config;

pub use file_config::{FileConfig, PipelineConfig};

use crate::logging::LogLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// TTL applied when a payload carries none: 3 days.
pub const DEFAULT_TTL_SECS: i64 = 259_200;
/// Rows older than this are neither restored nor kept: 7 days.
pub const RESTORE_WINDOW_SECS: i64 = 604_800;
pub const RESTORE_DELAY_MS: u64 = 200;
pub const BOOT_RESTORE_DELAY_SECS: u64 = 15;
pub const MAX_RESTORE_COUNT: usize = 49;
pub const MAX_SHADE_NOTIFICATIONS: usize = 49;
pub const FOREGROUND_TIMEOUT_MS: u64 = 25_000;
/// Work handed to a scheduler and not run within this long stops blocking
/// redeliveries of its id: 10 minutes.
pub const SCHEDULED_WORK_TIMEOUT_SECS: u64 = 600;

/// CLI arguments that can be used for config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_level: LogLevel,
    pub settings: PipelineSettings,
}

/// Tunables of the notification pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub default_ttl_secs: i64,
    pub restore_window_secs: i64,
    pub restore_delay_ms: u64,
    pub boot_restore_delay_secs: u64,
    pub max_restore_count: usize,
    pub max_shade_notifications: usize,
    pub foreground_timeout_ms: u64,
    pub scheduled_work_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL_SECS,
            restore_window_secs: RESTORE_WINDOW_SECS,
            restore_delay_ms: RESTORE_DELAY_MS,
            boot_restore_delay_secs: BOOT_RESTORE_DELAY_SECS,
            max_restore_count: MAX_RESTORE_COUNT,
            max_shade_notifications: MAX_SHADE_NOTIFICATIONS,
            foreground_timeout_ms: FOREGROUND_TIMEOUT_MS,
            scheduled_work_timeout_secs: SCHEDULED_WORK_TIMEOUT_SECS,
        }
    }
}

impl PipelineSettings {
    /// Defaults merged with a `[pipeline]` table.
    pub fn from_file(file: &PipelineConfig) -> Self {
        let defaults = Self::default();
        Self {
            default_ttl_secs: file
                .default_ttl_secs
                .map(|v| i64::try_from(v).unwrap_or(i64::MAX))
                .unwrap_or(defaults.default_ttl_secs),
            restore_window_secs: file
                .restore_window_secs
                .map(|v| i64::try_from(v).unwrap_or(i64::MAX))
                .unwrap_or(defaults.restore_window_secs),
            restore_delay_ms: file.restore_delay_ms.unwrap_or(defaults.restore_delay_ms),
            boot_restore_delay_secs: file
                .boot_restore_delay_secs
                .unwrap_or(defaults.boot_restore_delay_secs),
            max_restore_count: file.max_restore_count.unwrap_or(defaults.max_restore_count),
            max_shade_notifications: file
                .max_shade_notifications
                .unwrap_or(defaults.max_shade_notifications),
            foreground_timeout_ms: file
                .foreground_timeout_ms
                .unwrap_or(defaults.foreground_timeout_ms),
            scheduled_work_timeout_secs: file
                .scheduled_work_timeout_secs
                .unwrap_or(defaults.scheduled_work_timeout_secs),
        }
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub fn boot_restore_delay(&self) -> Duration {
        Duration::from_secs(self.boot_restore_delay_secs)
    }

    pub fn foreground_timeout(&self) -> Duration {
        Duration::from_millis(self.foreground_timeout_ms)
    }

    pub fn scheduled_work_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduled_work_timeout_secs)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified on the command line or in config file")
            })?;

        // The database file may be new, its directory may not
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
            if !parent.is_dir() {
                bail!("Database parent is not a directory: {:?}", parent);
            }
        }
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let log_level = file
            .log_level
            .and_then(|s| parse_log_level(&s))
            .unwrap_or(cli.log_level);

        let settings = file
            .pipeline
            .map(|p| PipelineSettings::from_file(&p))
            .unwrap_or_default();

        Ok(Self {
            db_path,
            log_level,
            settings,
        })
    }
}

/// Parses a log level name. Uses clap's ValueEnum trait for parsing.
fn parse_log_level(s: &str) -> Option<LogLevel> {
    LogLevel::from_str(s, true).ok()
}
