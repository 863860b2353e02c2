//! Reshapes a raw model reply into a persona's voice.
//!
//! The pipeline runs in a fixed order: length adjustment, pattern removal,
//! custom formatters, emoticon injection, expression injection and ending
//! enforcement. Steps after length adjustment only apply to personas with a
//! registered [`PersonaStyle`]. Emoticon, expression and end-phrase choices
//! are random; the randomness comes from an injected [`RandomSource`].
//!
//! Formatting never blocks delivery: if any step fails the original content
//! is returned untouched.

pub mod style;

pub use style::{replace_all, PersonaStyle, StyleBook, TextTransform};

use std::fmt;

use tracing::error;

use crate::core::constants::EXPRESSION_PROBABILITY;
use crate::core::persona::{ChatLength, Persona};
use crate::utils::random::{RandomError, RandomSource};

#[derive(Debug)]
pub enum FormatError {
    Random(RandomError),
    /// A style step had to draw from a phrase set that is empty.
    EmptyPhraseSet(&'static str),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::Random(err) => write!(f, "{err}"),
            FormatError::EmptyPhraseSet(set) => write!(f, "style has no {set} to choose from"),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormatError::Random(err) => Some(err),
            FormatError::EmptyPhraseSet(_) => None,
        }
    }
}

impl From<RandomError> for FormatError {
    fn from(err: RandomError) -> Self {
        FormatError::Random(err)
    }
}

/// Splits `content` into runs of text each closed by one or more of `.`, `!`
/// or `?`. Trailing text without a terminator is not a sentence.
fn split_sentences(content: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = None;
    let mut terminated = false;

    for (idx, ch) in content.char_indices() {
        let is_terminator = matches!(ch, '.' | '!' | '?');
        match start {
            None if !is_terminator => start = Some(idx),
            None => {}
            Some(_) if is_terminator => terminated = true,
            Some(from) => {
                if terminated {
                    sentences.push(&content[from..idx]);
                    start = Some(idx);
                    terminated = false;
                }
            }
        }
    }
    if let (Some(from), true) = (start, terminated) {
        sentences.push(&content[from..]);
    }
    sentences
}

/// Shortens or pads `content` according to the persona's chat length.
/// `Short` drops everything after the second terminated sentence, and
/// unterminated text entirely.
pub fn adjust_response_length(content: &str, chat_length: ChatLength) -> String {
    match chat_length {
        ChatLength::Short => split_sentences(content)
            .into_iter()
            .take(2)
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" "),
        ChatLength::Long => content
            .replace(". ", ". For example, ")
            .replace("? ", "? To elaborate, "),
        ChatLength::Normal => content.to_string(),
    }
}

fn pick<'a>(
    rng: &mut dyn RandomSource,
    items: &'a [String],
    set: &'static str,
) -> Result<&'a str, FormatError> {
    if items.is_empty() {
        return Err(FormatError::EmptyPhraseSet(set));
    }
    let idx = rng.pick_index(items.len())?;
    Ok(items[idx].as_str())
}

pub struct PersonaFormatter {
    styles: StyleBook,
    rng: Box<dyn RandomSource>,
    expression_probability: f64,
}

impl PersonaFormatter {
    pub fn new(styles: StyleBook, rng: Box<dyn RandomSource>) -> Self {
        Self {
            styles,
            rng,
            expression_probability: EXPRESSION_PROBABILITY,
        }
    }

    pub fn with_expression_probability(mut self, probability: f64) -> Self {
        self.expression_probability = probability;
        self
    }

    pub fn styles(&self) -> &StyleBook {
        &self.styles
    }

    /// Formats `content` for `persona`, falling back to `content` on failure.
    pub fn format_persona_response(&mut self, content: &str, persona: &Persona) -> String {
        match self.try_format(content, persona) {
            Ok(formatted) => formatted,
            Err(err) => {
                error!(persona = %persona.name, "Error formatting persona response: {err}");
                content.to_string()
            }
        }
    }

    fn try_format(&mut self, content: &str, persona: &Persona) -> Result<String, FormatError> {
        let mut formatted = adjust_response_length(content, persona.chat_length());

        let Some(style) = self.styles.get(&persona.style_key()) else {
            return Ok(formatted);
        };
        let rng = self.rng.as_mut();

        for pattern in &style.removals {
            formatted = pattern.replace_all(&formatted, "").into_owned();
        }

        for formatter in &style.formatters {
            formatted = formatter(&formatted);
        }

        if let Some(emoticons) = &style.emoticons {
            if !emoticons.iter().any(|emote| formatted.contains(emote.as_str())) {
                let emote = pick(rng, emoticons, "emoticons")?;
                formatted = format!("{formatted} {emote}");
            }
        }

        let lowered = formatted.to_lowercase();
        let has_expression = style
            .expressions
            .iter()
            .any(|expr| lowered.contains(&expr.to_lowercase()));
        if !has_expression && rng.next_f64()? < self.expression_probability {
            let expr = pick(rng, &style.expressions, "expressions")?;
            formatted = format!("{expr}, {formatted}");
        }

        let trimmed = formatted.trim();
        if !style
            .end_phrases
            .iter()
            .any(|phrase| trimmed.ends_with(phrase.as_str()))
        {
            let phrase = pick(rng, &style.end_phrases, "end phrases")?;
            formatted = format!("{trimmed}{phrase}");
        }

        Ok(formatted)
    }
}
