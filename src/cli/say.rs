//! TUI-less "say" command

use std::error::Error;
use std::io::Write;

use chrono::SecondsFormat;
use tracing::debug;

use crate::core::session::{ExchangeOutcome, Session};

pub fn run_say(
    session: &mut Session,
    persona: &str,
    identifier: &str,
    prompt: &[String],
    reply: &str,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: super-okai say --reply <REPLY> <PROMPT>".into());
    }

    match session.exchange(persona, identifier, &prompt, |_, _| reply.to_string()) {
        ExchangeOutcome::Replied {
            reply,
            log_id,
            cached,
        } => {
            debug!(?log_id, cached, "Exchange complete");
            writeln!(out, "{}", reply.content)?;
            Ok(())
        }
        ExchangeOutcome::RateLimited { reset_time } => {
            let when = match reset_time {
                Some(at) => at.to_rfc3339_opts(SecondsFormat::Secs, true),
                None => "the current window closes".to_string(),
            };
            let message = format!("⏳ Rate limit reached for '{identifier}'. Try again after {when}.");
            Err(message.into())
        }
    }
}
