use std::error::Error;
use std::io::Write;

use crate::core::config::Config;
use crate::core::persona::{ChatLength, PersonaRoster};
use crate::formatter::{PersonaFormatter, StyleBook};
use crate::utils::random::OsRandom;

pub fn run_format(
    config: &Config,
    persona: &str,
    length: Option<&str>,
    text: &[String],
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let mut formatter = PersonaFormatter::new(StyleBook::builtin()?, Box::new(OsRandom));
    format_with(&mut formatter, config, persona, length, text, out)
}

pub(crate) fn format_with(
    formatter: &mut PersonaFormatter,
    config: &Config,
    persona: &str,
    length: Option<&str>,
    text: &[String],
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let roster = PersonaRoster::new(&config.personas);
    let mut persona = roster.resolve(persona);
    if let Some(length) = length {
        persona = persona.with_chat_length(ChatLength::from(length));
    }

    let formatted = formatter.format_persona_response(&text.join(" "), &persona);
    writeln!(out, "{formatted}")?;
    Ok(())
}
