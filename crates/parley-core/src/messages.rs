use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ConversationId, DocumentId};
use crate::validate::ValidatedMessage;

/// A decoded inbound frame. Only `chat_id`, `role` and `content` are read;
/// anything else rides along untouched.
pub type Payload = serde_json::Map<String, Value>;

/// The persisted unit: one chat message in one conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageDocument {
    pub chat_id: ConversationId,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
}

impl MessageDocument {
    /// Build an unsaved document stamped with the current time.
    pub fn new(chat_id: ConversationId, message: ValidatedMessage) -> Self {
        Self::at(chat_id, message, Utc::now())
    }

    pub fn at(chat_id: ConversationId, message: ValidatedMessage, created_at: DateTime<Utc>) -> Self {
        Self {
            chat_id,
            role: message.role,
            content: message.content,
            created_at,
            id: None,
        }
    }

    /// Attach the store-assigned id. The document is final after this.
    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Force any `_id` in a message object into its text form.
///
/// Handles bare numbers, booleans and extended-JSON object ids
/// (`{"$oid": "..."}`). Values that are already strings are left alone.
pub fn stringify_identifiers(message: &mut Value) {
    let Some(object) = message.as_object_mut() else {
        return;
    };
    let Some(id) = object.get_mut("_id") else {
        return;
    };

    let text = match &*id {
        Value::String(_) | Value::Null => return,
        Value::Object(inner) => match inner.get("$oid") {
            Some(Value::String(oid)) => oid.clone(),
            _ => Value::Object(inner.clone()).to_string(),
        },
        other => other.to_string(),
    };
    *id = Value::String(text);
}
