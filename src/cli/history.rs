use std::error::Error;
use std::io::Write;

use crate::core::session::Session;

pub fn run_history(
    session: &Session,
    persona: Option<&str>,
    clear: bool,
    clear_all: bool,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let conversations = session.conversations();

    if clear_all {
        conversations.clear_all_conversations();
        writeln!(out, "✅ Cleared all conversation history")?;
        return Ok(());
    }

    let Some(name) = persona else {
        let personas = conversations.personas();
        if personas.is_empty() {
            writeln!(out, "No stored conversations.")?;
        }
        for name in personas {
            let count = conversations.get_conversation(&name).len();
            writeln!(out, "{name}\t{count} messages")?;
        }
        return Ok(());
    };

    let persona = session.roster().resolve(name);
    if clear {
        conversations.clear_conversation(&persona.name);
        writeln!(out, "✅ Cleared history for {}", persona.display_name())?;
        return Ok(());
    }

    let messages = conversations.get_conversation(&persona.name);
    if messages.is_empty() {
        writeln!(out, "No history for {}.", persona.display_name())?;
    }
    for message in messages {
        let label = if message.role.is_user() {
            "You"
        } else {
            persona.display_name()
        };
        writeln!(out, "{label}: {}", message.content)?;
    }
    Ok(())
}
