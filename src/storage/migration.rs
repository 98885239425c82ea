//! One-time migration of the legacy storage layout
//!
//! Old releases wrote every key under a `TWG::` prefix and kept messages as
//! flat `{id, role, content}` records. Image messages stored their content as
//! a data URL.

use serde::Deserialize;
use serde_json::Value;

use crate::storage::history::MESSAGES_KEY;
use crate::storage::kv::JsonStore;
use crate::storage::StorageError;
use crate::types::message::{Message, Part, Role};

const LEGACY_PREFIX: &str = "TWG::";

#[derive(Debug, Deserialize)]
struct LegacyMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: String,
}

impl From<LegacyMessage> for Message {
    fn from(old: LegacyMessage) -> Self {
        let part = match parse_data_url(&old.content) {
            Some((mime_type, data)) => Part::inline(mime_type, data),
            None => Part::text(old.content),
        };
        Message {
            id: old.id,
            role: Role::from_loose(&old.role),
            parts: vec![part],
            timestamp: 0,
        }
    }
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload
fn parse_data_url(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("data:")?;
    if !rest.starts_with("image/") {
        return None;
    }
    rest.split_once(";base64,")
}

/// Move legacy keys into the current layout
///
/// Returns the number of migrated keys; zero once nothing legacy remains.
pub fn migrate_legacy(store: &JsonStore) -> Result<usize, StorageError> {
    let legacy: Vec<String> = store
        .raw_keys()
        .into_iter()
        .filter(|k| k.starts_with(LEGACY_PREFIX))
        .collect();

    for key in &legacy {
        let Some(value) = store.get_raw(key) else {
            continue;
        };
        let name = &key[LEGACY_PREFIX.len()..];
        let migrated = if name == MESSAGES_KEY {
            convert_messages(value)?
        } else {
            value
        };
        store.set_raw(name, migrated)?;
        store.remove_raw(key)?;
        tracing::info!("Migrated legacy key '{}'", key);
    }

    Ok(legacy.len())
}

fn convert_messages(value: Value) -> Result<Value, StorageError> {
    let old: Vec<LegacyMessage> = serde_json::from_value(value)?;
    let messages: Vec<Message> = old.into_iter().map(Message::from).collect();
    Ok(serde_json::to_value(messages)?)
}
