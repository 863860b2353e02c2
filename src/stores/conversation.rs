use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::error;

use crate::core::constants::CONVERSATIONS_KEY;
use crate::core::message::Message;
use crate::storage::{self, KeyValueStore, StorageError};

/// Persisted shape: persona name -> chronological messages.
pub type StoredConversations = BTreeMap<String, Vec<Message>>;

/// Per-persona conversation history kept in one storage record.
///
/// Every operation is a read-modify-write of the whole record. Within one
/// process the writes are serialized; across processes the last write wins.
/// Storage problems are logged and degrade to "no history".
pub struct ConversationStore {
    storage: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<StoredConversations, StorageError> {
        Ok(storage::read_json(self.storage.as_ref(), CONVERSATIONS_KEY)?.unwrap_or_default())
    }

    pub fn get_conversation(&self, persona_name: &str) -> Vec<Message> {
        match self.load() {
            Ok(mut conversations) => conversations.remove(persona_name).unwrap_or_default(),
            Err(err) => {
                error!("Error reading conversation: {err}");
                Vec::new()
            }
        }
    }

    /// Replaces the persona's stored history with `messages`.
    pub fn save_conversation(&self, persona_name: &str, messages: &[Message]) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self.load().and_then(|mut conversations| {
            conversations.insert(persona_name.to_string(), messages.to_vec());
            storage::write_json(self.storage.as_ref(), CONVERSATIONS_KEY, &conversations)
        });
        if let Err(err) = result {
            error!("Error saving conversation: {err}");
        }
    }

    pub fn clear_conversation(&self, persona_name: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match storage::read_json::<StoredConversations>(
            self.storage.as_ref(),
            CONVERSATIONS_KEY,
        ) {
            Ok(Some(mut conversations)) => {
                conversations.remove(persona_name);
                storage::write_json(self.storage.as_ref(), CONVERSATIONS_KEY, &conversations)
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            error!("Error clearing conversation: {err}");
        }
    }

    pub fn clear_all_conversations(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = self.storage.remove_item(CONVERSATIONS_KEY) {
            error!("Error clearing all conversations: {err}");
        }
    }

    /// Names of personas with stored history, sorted.
    pub fn personas(&self) -> Vec<String> {
        match self.load() {
            Ok(conversations) => conversations.into_keys().collect(),
            Err(err) => {
                error!("Error reading conversations: {err}");
                Vec::new()
            }
        }
    }
}
