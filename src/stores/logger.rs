//! Retention-capped archive of complete conversations.
//!
//! Every successful exchange appends a snapshot of the whole conversation.
//! The list is kept oldest-first, capped at `max_logs` entries and pruned of
//! entries older than the retention period when the logger starts. The
//! archive can be rendered as a plain-text transcript and written to disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::constants::{
    DEFAULT_LOG_RETENTION_DAYS, DEFAULT_MAX_LOGS, EXPORT_RULE_WIDTH, LOGS_KEY, USER_LABEL,
};
use crate::core::message::Message;
use crate::storage::{self, KeyValueStore};
use crate::utils::clock::{from_millis, Clock};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub max_logs: usize,
    pub retention_days: u32,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

/// One archived conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub messages: Vec<Message>,
    pub persona: String,
}

pub struct ConversationLogger {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: LogSettings,
    write_lock: Mutex<()>,
}

impl ConversationLogger {
    /// Creates the logger and prunes entries past the retention period.
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: LogSettings,
    ) -> Self {
        let logger = Self {
            storage,
            clock,
            settings,
            write_lock: Mutex::new(()),
        };
        logger.cleanup_old_logs(settings.retention_days);
        logger
    }

    pub fn settings(&self) -> LogSettings {
        self.settings
    }

    /// All stored entries, oldest first. Unreadable storage yields an empty list.
    pub fn logs(&self) -> Vec<ConversationLog> {
        match storage::read_json(self.storage.as_ref(), LOGS_KEY) {
            Ok(logs) => logs.unwrap_or_default(),
            Err(err) => {
                error!("Error reading logs: {err}");
                Vec::new()
            }
        }
    }

    /// Persists `logs`. When storage is full, retries once with only the
    /// most recent half of the list (at least the newest entry).
    fn save_logs(&self, logs: &[ConversationLog]) -> bool {
        let err = match storage::write_json(self.storage.as_ref(), LOGS_KEY, logs) {
            Ok(()) => return true,
            Err(err) => err,
        };

        if !err.is_quota_exceeded() {
            error!("Error saving logs: {err}");
            return false;
        }

        let keep = (logs.len() / 2).max(1).min(logs.len());
        let reduced = &logs[logs.len() - keep..];
        warn!(
            dropped = logs.len() - keep,
            kept = keep,
            "Log storage full; discarding oldest logs"
        );
        match storage::write_json(self.storage.as_ref(), LOGS_KEY, reduced) {
            Ok(()) => true,
            Err(err) => {
                error!("Error saving reduced logs: {err}");
                false
            }
        }
    }

    /// Appends a snapshot of `messages` and returns the new entry's id, or
    /// `None` if it could not be stored. An unreadable record is replaced.
    pub fn log_conversation(&self, messages: &[Message], persona: &str) -> Option<String> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let log = ConversationLog {
            id: Uuid::new_v4().to_string(),
            timestamp: self.clock.now_millis(),
            messages: messages.to_vec(),
            persona: persona.to_string(),
        };
        let id = log.id.clone();

        let mut logs = self.logs();
        logs.push(log);

        let cap = self.settings.max_logs.max(1);
        if logs.len() > cap {
            let excess = logs.len() - cap;
            logs.drain(..excess);
        }

        if self.save_logs(&logs) {
            info!(id = %id, "Conversation logged");
            Some(id)
        } else {
            None
        }
    }

    fn format_conversation(log: &ConversationLog) -> String {
        let date = from_millis(log.timestamp).to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut content = format!(
            "Conversation ID: {}\nDate: {}\nPersona: {}\n\n--- Messages ---\n\n",
            log.id, date, log.persona
        );

        let turns: Vec<String> = log
            .messages
            .iter()
            .map(|msg| {
                let label = if msg.role.is_assistant() {
                    log.persona.as_str()
                } else {
                    USER_LABEL
                };
                format!("[{label}]: {}\n", msg.content)
            })
            .collect();
        content.push_str(&turns.join("\n"));
        content
    }

    /// Renders every stored entry as a human-readable transcript.
    pub fn render_all_logs(&self) -> String {
        let separator = format!("\n\n{}\n\n", "=".repeat(EXPORT_RULE_WIDTH));
        self.logs()
            .iter()
            .map(Self::format_conversation)
            .collect::<Vec<_>>()
            .join(&separator)
    }

    /// Writes the transcript of all logs to a timestamped file in `dir` and
    /// returns its path. Stored logs are not modified.
    pub fn download_all_logs(&self, dir: &Path) -> Option<PathBuf> {
        let content = self.render_all_logs();
        let stamp = self.clock.now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
        let path = dir.join(format!("super-okai-logs-{stamp}.txt"));

        match Self::write_export(dir, &path, &content) {
            Ok(()) => {
                info!(path = %path.display(), "Logs exported");
                Some(path)
            }
            Err(err) => {
                error!("Error downloading logs: {err}");
                None
            }
        }
    }

    fn write_export(
        dir: &Path,
        path: &Path,
        content: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        fs::create_dir_all(dir)?;
        let mut temp_file = NamedTempFile::new_in(dir)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(path)?;
        Ok(())
    }

    /// Drops entries older than `days_to_keep` days and returns how many
    /// were removed. Storage is only rewritten when something was removed.
    pub fn cleanup_old_logs(&self, days_to_keep: u32) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let logs = self.logs();
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(i64::from(days_to_keep).saturating_mul(MILLIS_PER_DAY));
        let before = logs.len();
        let kept: Vec<ConversationLog> = logs
            .into_iter()
            .filter(|log| log.timestamp >= cutoff)
            .collect();
        let removed = before - kept.len();

        if removed > 0 && self.save_logs(&kept) {
            info!("Cleaned up {removed} old logs");
        }
        removed
    }

    pub fn clear_all_logs(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.storage.remove_item(LOGS_KEY) {
            Ok(()) => info!("All logs cleared"),
            Err(err) => error!("Error clearing logs: {err}"),
        }
    }
}
