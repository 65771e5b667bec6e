//! Application configuration
//!
//! Central location for configuration constants, resource limits and
//! validation boundaries, plus the runtime [`AppConfig`] loaded at startup.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ===== Document Numbers =====

/// Prefix of quotation numbers (shared by quotations and tickets)
pub const QUOTATION_NUMBER_PREFIX: &str = "QTN";

/// Prefix of invoice numbers (shared by invoices and finalized tickets)
pub const INVOICE_NUMBER_PREFIX: &str = "INV";

/// Prefix of expense numbers
pub const EXPENSE_NUMBER_PREFIX: &str = "EXP";

// ===== Pagination =====

/// Page size used when a list request does not name one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a list request may ask for
pub const MAX_PAGE_SIZE: u32 = 100;

/// Longest accepted search term
pub const MAX_SEARCH_LENGTH: usize = 200;

// ===== Cache =====

/// Time-to-live of a cached document in seconds
pub const DOCUMENT_CACHE_TTL_SECS: u64 = 300;

/// Time-to-live of a cached list page in seconds
pub const LIST_CACHE_TTL_SECS: u64 = 60;

/// Time-to-live of the dashboard summary in seconds
pub const DASHBOARD_CACHE_TTL_SECS: u64 = 120;

/// Time-to-live of the calendar feed in seconds
pub const CALENDAR_CACHE_TTL_SECS: u64 = 600;

/// Key of the shared dashboard aggregate
pub const DASHBOARD_CACHE_KEY: &str = "dashboard:summary";

/// Key of the production calendar feed
pub const CALENDAR_CACHE_KEY: &str = "calendar:feed";

// ===== Backups =====

/// Minimum number of backup archives kept
pub const MIN_BACKUP_RETENTION: u32 = 1;

/// Maximum number of backup archives kept
pub const MAX_BACKUP_RETENTION: u32 = 365;

// ===== Schedules =====

/// Default spreadsheet export schedule: every night at 01:00
pub const DEFAULT_EXPORT_SCHEDULE: &str = "0 0 1 * * *";

/// Default backup schedule: every night at 02:00
pub const DEFAULT_BACKUP_SCHEDULE: &str = "daily";

/// Runtime configuration
///
/// Every field has a default, so an empty or missing config file is valid.
/// Environment variables take precedence over the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Directory holding the database, exports and backups
    pub data_dir: PathBuf,
    /// Redis connection URL; the in-process cache is used when absent
    pub redis_url: Option<String>,
    /// Disable caching altogether
    pub cache_enabled: bool,
    /// Export schedule: a 6-field cron expression or a frequency like `12h`
    pub export_schedule: Option<String>,
    /// Backup schedule: a 6-field cron expression or a frequency like `daily`
    pub backup_schedule: Option<String>,
    /// Number of backup archives kept
    pub backup_retention: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            redis_url: None,
            cache_enabled: true,
            export_schedule: Some(DEFAULT_EXPORT_SCHEDULE.to_string()),
            backup_schedule: Some(DEFAULT_BACKUP_SCHEDULE.to_string()),
            backup_retention: 30,
        }
    }
}

impl AppConfig {
    /// Load from an optional JSON file, apply `BIZDESK_*` overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from {:?}", path);
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            Some(path) => {
                tracing::warn!("Config file {:?} not found, using defaults", path);
                AppConfig::default()
            }
            None => AppConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("BIZDESK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("BIZDESK_REDIS_URL") {
            self.redis_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(schedule) = lookup("BIZDESK_EXPORT_CRON") {
            self.export_schedule = Some(schedule).filter(|s| !s.trim().is_empty());
        }
        if let Some(schedule) = lookup("BIZDESK_BACKUP_CRON") {
            self.backup_schedule = Some(schedule).filter(|s| !s.trim().is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(AppError::validation("dataDir cannot be empty"));
        }

        if !(MIN_BACKUP_RETENTION..=MAX_BACKUP_RETENTION).contains(&self.backup_retention) {
            return Err(AppError::validation(format!(
                "backupRetention must be between {} and {}",
                MIN_BACKUP_RETENTION, MAX_BACKUP_RETENTION
            )));
        }

        if let Some(url) = &self.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(AppError::validation(
                    "redisUrl must start with redis:// or rediss://",
                ));
            }
        }

        for (field, schedule) in [
            ("exportSchedule", &self.export_schedule),
            ("backupSchedule", &self.backup_schedule),
        ] {
            if let Some(schedule) = schedule {
                crate::services::scheduler::resolve_schedule(schedule)
                    .map_err(|e| AppError::validation(format!("{}: {}", field, e)))?;
            }
        }

        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bizdesk.db")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}
