// src/config.rs

//! Configuration loading.
//!
//! Non-sensitive settings come from a TOML file; credentials may be
//! supplied or overridden through environment variables. The resulting
//! `Config` is immutable process-wide state, built once in `main` and
//! passed explicitly to constructors.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, Result};

/// Root configuration structure.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    /// Comma-separated HH:MM wall-clock times for daemon mode,
    /// interpreted in the process-local time zone.
    pub scrape_times: String,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub journal: JournalConfig,
    pub notifications: NotificationsConfig,
    pub healthcheck: HealthcheckConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            scrape_times: "21:00".to_string(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
            journal: JournalConfig::default(),
            notifications: NotificationsConfig::default(),
            healthcheck: HealthcheckConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Credentials for the remote grade API (opaque to the core).
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ApiConfig {
    pub key: Option<String>,
    pub secret: Option<String>,
    pub domain: Option<String>,
}

/// Snapshot store settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Max wait for store write locks, in milliseconds
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/grades.db"),
            timeout_ms: 30_000,
        }
    }
}

/// Fetch retry settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 5_000,
        }
    }
}

/// Change journal settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JournalConfig {
    pub path: PathBuf,
    /// Prune horizon in days; 0 disables pruning
    pub retention_days: u32,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/grade_changes.log"),
            retention_days: 90,
        }
    }
}

/// Per-provider notification settings. A provider is available only when
/// its mandatory keys are present.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NotificationsConfig {
    pub pushover: PushoverConfig,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PushoverConfig {
    pub token: Option<String>,
    pub user_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
}

/// Uptime ping settings.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HealthcheckConfig {
    pub url: Option<String>,
}

/// Logging settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// One of debug|info|warn|error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides. Falls back to defaults if the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            log::warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override secrets and schedule from the environment. Environment
    /// values win over the settings file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GRADEWATCH_API_KEY") {
            self.api.key = Some(v);
        }
        if let Ok(v) = std::env::var("GRADEWATCH_API_SECRET") {
            self.api.secret = Some(v);
        }
        if let Ok(v) = std::env::var("GRADEWATCH_API_DOMAIN") {
            self.api.domain = Some(v);
        }
        if let Ok(v) = std::env::var("SCRAPE_TIMES") {
            self.scrape_times = v;
        }
        if let Ok(v) = std::env::var("PUSHOVER_TOKEN") {
            self.notifications.pushover.token = Some(v);
        }
        if let Ok(v) = std::env::var("PUSHOVER_USER_KEY") {
            self.notifications.pushover.user_key = Some(v);
        }
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            self.notifications.gemini.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("HEALTHCHECK_URL") {
            self.healthcheck.url = Some(v);
        }
    }

    /// Validate required settings. Called once at startup; failures are
    /// fatal configuration errors.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.api.key.as_deref().unwrap_or("").is_empty()
            || self.api.secret.as_deref().unwrap_or("").is_empty()
        {
            errors.push("missing API credentials: set api.key and api.secret".to_string());
        }
        if self.api.domain.as_deref().unwrap_or("").is_empty() {
            errors.push("missing API domain: set api.domain".to_string());
        }
        if !matches!(self.log.level.as_str(), "debug" | "info" | "warn" | "error") {
            errors.push(format!("unknown log.level '{}'", self.log.level));
        }
        if !self.scrape_times.trim().is_empty() {
            if let Err(e) = crate::pipeline::scheduler::parse_times(&self.scrape_times) {
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::config(errors.join("; ")))
        }
    }
}
