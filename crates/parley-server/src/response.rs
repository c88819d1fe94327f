use serde::Serialize;
use serde_json::Value;

use parley_core::messages::stringify_identifiers;
use parley_core::{FieldErrors, MessageDocument, ProtocolError};

/// Body of an `{"errors": ...}` frame: a short code, a cause string, or
/// per-field messages.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Text(String),
    Fields(FieldErrors),
}

/// Every frame the server sends.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingResponse {
    Created {
        #[serde(rename = "type")]
        kind: &'static str,
    },
    Errors {
        errors: ErrorBody,
    },
    Saved {
        ok: bool,
        message: MessageDocument,
    },
    Broadcast {
        message: Value,
    },
}

impl OutgoingResponse {
    pub fn created() -> Self {
        Self::Created { kind: "created" }
    }

    pub fn saved(message: MessageDocument) -> Self {
        Self::Saved { ok: true, message }
    }

    /// Forward a message from another producer. Any `_id` is turned into
    /// text first.
    pub fn broadcast(mut message: Value) -> Self {
        stringify_identifiers(&mut message);
        Self::Broadcast { message }
    }

    pub fn from_error(error: &ProtocolError) -> Self {
        let errors = match error {
            ProtocolError::InvalidJson | ProtocolError::InvalidPayload => {
                ErrorBody::Text(error.error_kind().to_string())
            }
            ProtocolError::ValidationFailed(fields) => ErrorBody::Fields(fields.clone()),
            ProtocolError::Persistence(cause) => ErrorBody::Text(cause.clone()),
        };
        Self::Errors { errors }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::validate::REQUIRED;
    use parley_core::{ConversationId, DocumentId, ValidatedMessage};
    use serde_json::json;

    #[test]
    fn created_frame() {
        let json = serde_json::to_value(OutgoingResponse::created()).unwrap();
        assert_eq!(json, json!({"type": "created"}));
    }

    #[test]
    fn codec_errors_use_codes() {
        let json = serde_json::to_value(OutgoingResponse::from_error(&ProtocolError::InvalidJson)).unwrap();
        assert_eq!(json, json!({"errors": "invalid_json"}));

        let json =
            serde_json::to_value(OutgoingResponse::from_error(&ProtocolError::InvalidPayload)).unwrap();
        assert_eq!(json, json!({"errors": "invalid_payload"}));
    }

    #[test]
    fn validation_errors_are_field_maps() {
        let mut fields = FieldErrors::new();
        fields.add("content", REQUIRED);
        let response = OutgoingResponse::from_error(&ProtocolError::ValidationFailed(fields));
        assert!(matches!(response, OutgoingResponse::Errors { .. }));
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"errors": {"content": [REQUIRED]}})
        );
    }

    #[test]
    fn persistence_errors_carry_cause() {
        let response =
            OutgoingResponse::from_error(&ProtocolError::Persistence("database is locked".into()));
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"errors": "database is locked"})
        );
    }

    #[test]
    fn saved_frame_has_text_id() {
        let doc = MessageDocument::new(
            ConversationId::from_raw("abc"),
            ValidatedMessage {
                role: "user".into(),
                content: "hi".into(),
            },
        )
        .with_id(DocumentId::new(3));

        let json = serde_json::to_value(OutgoingResponse::saved(doc)).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["message"]["_id"], json!("3"));
        assert_eq!(json["message"]["chat_id"], "abc");
    }

    #[test]
    fn broadcast_frame_stringifies_id() {
        let response = OutgoingResponse::broadcast(json!({"_id": 12, "content": "x"}));
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"message": {"_id": "12", "content": "x"}})
        );
    }

    #[test]
    fn broadcast_frame_passes_null_through() {
        let json = serde_json::to_value(OutgoingResponse::broadcast(Value::Null)).unwrap();
        assert_eq!(json, json!({"message": null}));
    }
}
