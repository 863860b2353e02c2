use regex::Regex;
use std::collections::HashMap;

/// A text transform applied to a reply after pattern removal.
pub type TextTransform = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Voice rules for one persona.
pub struct PersonaStyle {
    /// Signature interjections, compared case-insensitively.
    pub expressions: Vec<String>,
    /// A styled reply always ends with one of these.
    pub end_phrases: Vec<String>,
    pub emoticons: Option<Vec<String>>,
    /// Stripped from the reply in order.
    pub removals: Vec<Regex>,
    /// Applied in order after removals.
    pub formatters: Vec<TextTransform>,
}

/// Builds a transform that replaces every match of `pattern` with `replacement`.
pub fn replace_all(
    pattern: &str,
    replacement: &'static str,
) -> Result<TextTransform, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(Box::new(move |content: &str| {
        regex.replace_all(content, replacement).into_owned()
    }))
}

fn phrases(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn patterns(items: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    items.iter().map(|p| Regex::new(p)).collect()
}

/// Filler that gives away an assistant voice.
const ASSISTANT_FILLER: &str = r"(?i)knowledge base|previous response|as an AI|AI assistant";

fn okai() -> Result<PersonaStyle, regex::Error> {
    Ok(PersonaStyle {
        emoticons: Some(phrases(&[
            "(｀・ω・´)",
            "(◕‿◕✿)",
            "(ﾉ◕ヮ◕)ﾉ*:･ﾟ✨",
            "(≧▽≦)",
            "(´･ω･`)",
        ])),
        expressions: phrases(&["sugoi", "kawaii", "subarashii", "nya", "desu"]),
        end_phrases: phrases(&["~", "✨", "!"]),
        removals: patterns(&[
            r"(?i)(\b|^)I apologize\b",
            r"(?i)(\b|^)sorry\b",
            ASSISTANT_FILLER,
        ])?,
        formatters: vec![replace_all(r"!+", "~! ✨")?],
    })
}

fn elon_musk() -> Result<PersonaStyle, regex::Error> {
    Ok(PersonaStyle {
        emoticons: None,
        expressions: phrases(&["obviously", "absolutely", "definitely", "probably"]),
        end_phrases: phrases(&["🚀", "⚡", "!"]),
        removals: patterns(&[r"(?i)(\b|^)(I apologize|sorry)\b", ASSISTANT_FILLER])?,
        formatters: vec![
            // Twitter-style brevity
            replace_all(r"(?i)\b(that|which|who)\b", "")?,
            replace_all(r"(?i)good|great", "insanely great")?,
        ],
    })
}

/// Styles keyed by lower-cased persona name.
#[derive(Default)]
pub struct StyleBook {
    styles: HashMap<String, PersonaStyle>,
}

impl StyleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// The styles for the shipped personas.
    pub fn builtin() -> Result<Self, regex::Error> {
        let mut book = Self::new();
        book.insert("okai", okai()?);
        book.insert("elonmusk", elon_musk()?);
        Ok(book)
    }

    pub fn insert(&mut self, persona_name: &str, style: PersonaStyle) {
        self.styles.insert(persona_name.to_lowercase(), style);
    }

    pub fn get(&self, key: &str) -> Option<&PersonaStyle> {
        self.styles.get(key)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_styles_compile_and_are_keyed_lowercase() {
        let book = StyleBook::builtin().expect("builtin patterns compile");
        assert_eq!(book.len(), 2);
        assert!(book.get("okai").is_some());
        assert!(book.get("elonmusk").is_some());
        assert!(book.get("Okai").is_none());
    }

    #[test]
    fn okai_formatter_sparkles_exclamations() {
        let style = okai().unwrap();
        assert_eq!((style.formatters[0])("Wow!!! Cool!"), "Wow~! ✨ Cool~! ✨");
    }

    #[test]
    fn elon_formatters_trim_relatives_and_amplify() {
        let style = elon_musk().unwrap();
        let content = style
            .formatters
            .iter()
            .fold("A good idea that works".to_string(), |acc, f| f(&acc));
        assert_eq!(content, "A insanely great idea  works");
    }

    #[test]
    fn removals_strip_apologies_case_insensitively() {
        let style = okai().unwrap();
        let content = style
            .removals
            .iter()
            .fold("Sorry, as an AI I apologize.".to_string(), |acc, re| {
                re.replace_all(&acc, "").into_owned()
            });
        assert_eq!(content, ",  .");
    }
}
