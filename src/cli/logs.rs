use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use chrono::SecondsFormat;

use crate::cli::LogsAction;
use crate::core::config::data::home_relative;
use crate::core::session::Session;
use crate::utils::clock::from_millis;

pub fn run_logs(
    session: &Session,
    action: LogsAction,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let logger = session.logger();
    match action {
        LogsAction::List => {
            let logs = logger.logs();
            if logs.is_empty() {
                writeln!(out, "No conversation logs.")?;
            }
            for log in logs {
                let date = from_millis(log.timestamp).to_rfc3339_opts(SecondsFormat::Secs, true);
                writeln!(
                    out,
                    "{}  {}  {:<12} {} messages",
                    log.id,
                    date,
                    log.persona,
                    log.messages.len()
                )?;
            }
        }
        LogsAction::Export { out: dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            match logger.download_all_logs(&dir) {
                Some(path) => writeln!(out, "✅ Logs written to {}", home_relative(path))?,
                None => return Err(format!("Could not write logs to {}", dir.display()).into()),
            }
        }
        LogsAction::Cleanup { days } => {
            let days = days.unwrap_or(logger.settings().retention_days);
            let removed = logger.cleanup_old_logs(days);
            writeln!(out, "Removed {removed} logs older than {days} days")?;
        }
        LogsAction::Clear => {
            logger.clear_all_logs();
            writeln!(out, "✅ All logs cleared")?;
        }
    }
    Ok(())
}
