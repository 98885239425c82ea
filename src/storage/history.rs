//! Message history and cached lists
//!
//! Chat messages are kept in memory and written back to the store on `save`.

use crate::storage::kv::JsonStore;
use crate::storage::StorageError;
use crate::types::message::Message;
use crate::types::model::ModelInfo;

pub const MESSAGES_KEY: &str = "messages";
const MODELS_KEY: &str = "models";

/// Conversation history backed by the key-value store
pub struct MessageHistory {
    store: JsonStore,
    messages: Vec<Message>,
}

impl MessageHistory {
    /// Load the stored conversation
    pub fn load(store: JsonStore) -> Self {
        let messages = store.get::<Vec<Message>>(MESSAGES_KEY).unwrap_or_default();
        tracing::debug!("Loaded {} messages", messages.len());
        Self { store, messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message unless one with the same id exists
    pub fn add(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replace the message with the given id
    pub fn update(&mut self, id: &str, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    /// Remove the message with the given id
    pub fn revoke(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn save(&self) -> Result<(), StorageError> {
        self.store.set(MESSAGES_KEY, &self.messages)
    }
}

/// Cache the last fetched model list
pub fn save_model_list(store: &JsonStore, models: &[ModelInfo]) -> Result<(), StorageError> {
    store.set(MODELS_KEY, &models)
}

pub fn load_model_list(store: &JsonStore) -> Vec<ModelInfo> {
    store.get(MODELS_KEY).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Role;

    #[test]
    fn test_add_update_revoke() {
        let store = JsonStore::in_memory();
        let mut history = MessageHistory::load(store.clone());

        let question = Message::text(Role::User, "hi");
        let answer = Message::text(Role::Model, "hello");
        assert!(history.add(question.clone()));
        assert!(!history.add(question.clone()));
        assert!(history.add(answer.clone()));

        let edited = Message {
            parts: vec![crate::types::message::Part::text("hello there")],
            ..answer.clone()
        };
        assert!(history.update(&answer.id, edited));
        assert_eq!(history.messages()[1].text_content(), "hello there");

        assert!(history.revoke(&answer.id).is_some());
        assert!(history.revoke("missing").is_none());
        history.save().unwrap();

        let reloaded = MessageHistory::load(store);
        assert_eq!(reloaded.messages().len(), 1);
        assert_eq!(reloaded.messages()[0].id, question.id);
    }

    #[test]
    fn test_model_list_cache() {
        let store = JsonStore::in_memory();
        assert!(load_model_list(&store).is_empty());
        let models: Vec<ModelInfo> =
            serde_json::from_str(r#"[{"name":"models/gemini-pro"}]"#).unwrap();
        save_model_list(&store, &models).unwrap();
        assert_eq!(load_model_list(&store), models);
    }
}
