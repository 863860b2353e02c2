use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::constants::{
    DEFAULT_LOG_RETENTION_DAYS, DEFAULT_MAX_LOGS, DEFAULT_MAX_REQUESTS, DEFAULT_TIME_WINDOW,
};
use crate::core::persona::Persona;
use crate::stores::logger::LogSettings;
use crate::stores::rate_limit::RateLimitConfig;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_requests: u32,
    pub time_window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            time_window_secs: DEFAULT_TIME_WINDOW.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogSection {
    pub max_logs: usize,
    pub retention_days: u32,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the persisted stores; defaults to the platform data dir
    pub storage_dir: Option<PathBuf>,
    /// Upper bound on the bytes all persisted stores may occupy
    pub storage_quota_bytes: Option<usize>,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub logs: LogSection,
    /// Persona definitions; the built-in set is used when empty
    #[serde(default)]
    pub personas: Vec<Persona>,
}

impl Config {
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit.max_requests,
            time_window: Duration::from_secs(self.rate_limit.time_window_secs),
        }
    }

    /// Log settings with the cap raised to at least one entry.
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            max_logs: self.logs.max_logs.max(1),
            retention_days: self.logs.retention_days,
        }
    }

    /// The configured storage directory, or the platform default.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(Self::default_storage_dir)
    }
}

/// Shortens `path` to `~/...` when it sits under the user's home directory.
pub fn home_relative(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    match home.as_deref().map(|home| path.strip_prefix(home)) {
        Some(Ok(rest)) if cfg!(unix) => format!("~/{}", rest.display()),
        _ => path.display().to_string(),
    }
}
