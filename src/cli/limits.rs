use std::error::Error;
use std::io::Write;

use chrono::SecondsFormat;

use crate::cli::LimitsAction;
use crate::core::session::Session;

pub fn run_limits(
    session: &Session,
    action: LimitsAction,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let limiter = session.limiter();
    let config = limiter.config();
    match action {
        LimitsAction::Stats => {
            let stats = limiter.limit_stats();
            writeln!(
                out,
                "{} active limits ({} requests per {}s)",
                stats.active_limits,
                config.max_requests,
                config.time_window.as_secs()
            )?;
            for stat in stats.limits {
                writeln!(
                    out,
                    "  {}: {} remaining, resets in {:.0}s",
                    stat.identifier, stat.remaining, stat.resets_in
                )?;
            }
        }
        LimitsAction::Check { identifier } => {
            let remaining = limiter.remaining_requests(&identifier);
            write!(
                out,
                "{identifier}: {remaining}/{} requests remaining",
                config.max_requests
            )?;
            match limiter.reset_time(&identifier) {
                Some(at) => writeln!(
                    out,
                    ", window resets at {}",
                    at.to_rfc3339_opts(SecondsFormat::Secs, true)
                )?,
                None => writeln!(out)?,
            }
        }
        LimitsAction::Clear { identifier: Some(identifier) } => {
            limiter.clear_limit(&identifier);
            writeln!(out, "✅ Cleared rate limit for {identifier}")?;
        }
        LimitsAction::Clear { identifier: None } => {
            limiter.clear_all_limits();
            writeln!(out, "✅ Cleared all rate limits")?;
        }
    }
    Ok(())
}
