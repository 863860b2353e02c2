use serde::{Deserialize, Serialize};

/// How much a persona elaborates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChatLength {
    Short,
    #[default]
    Normal,
    Long,
}

impl ChatLength {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatLength::Short => "short",
            ChatLength::Normal => "normal",
            ChatLength::Long => "long",
        }
    }
}

/// Unrecognized values fall back to [`ChatLength::Normal`].
impl From<&str> for ChatLength {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "short" => ChatLength::Short,
            "long" => ChatLength::Long,
            _ => ChatLength::Normal,
        }
    }
}

impl From<String> for ChatLength {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ChatLength> for String {
    fn from(value: ChatLength) -> Self {
        value.as_str().to_string()
    }
}

/// The parts of a persona definition this crate consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub chat_length: Option<ChatLength>,
}

impl Persona {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            chat_length: None,
        }
    }

    pub fn with_chat_length(mut self, chat_length: ChatLength) -> Self {
        self.chat_length = Some(chat_length);
        self
    }

    /// Name shown on assistant turns; falls back to `name`.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn chat_length(&self) -> ChatLength {
        self.chat_length.unwrap_or_default()
    }

    /// Key used to look up the persona's response style.
    pub fn style_key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Personas shipped with the binary, used when the config defines none.
pub fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona {
            name: "Okai".to_string(),
            display_name: Some("Okai".to_string()),
            description: Some(
                "A kawaii tech-savvy assistant who loves anime, gaming, and all things geeky!"
                    .to_string(),
            ),
            chat_length: Some(ChatLength::Normal),
        },
        Persona {
            name: "ElonMusk".to_string(),
            display_name: Some("Elon Musk".to_string()),
            description: Some("Visionary entrepreneur with a taste for rockets.".to_string()),
            chat_length: Some(ChatLength::Short),
        },
    ]
}

/// Resolves personas by name.
pub struct PersonaRoster {
    personas: Vec<Persona>,
}

impl PersonaRoster {
    /// Uses `configured` when non-empty, otherwise the built-in personas.
    pub fn new(configured: &[Persona]) -> Self {
        let personas = if configured.is_empty() {
            builtin_personas()
        } else {
            configured.to_vec()
        };
        Self { personas }
    }

    pub fn list_personas(&self) -> &[Persona] {
        &self.personas
    }

    /// Case-insensitive lookup by name.
    pub fn find(&self, name: &str) -> Option<&Persona> {
        self.personas
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Like [`find`](Self::find), but unknown names become an ad-hoc persona.
    pub fn resolve(&self, name: &str) -> Persona {
        self.find(name)
            .cloned()
            .unwrap_or_else(|| Persona::new(name))
    }
}
