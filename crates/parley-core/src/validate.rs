//! Chat message shape checks.
//!
//! Both `role` and `content` must be strings that are non-empty once
//! surrounding whitespace is trimmed. Every failing field is reported, not
//! just the first one.

use serde_json::Value;

use crate::errors::FieldErrors;
use crate::messages::Payload;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_A_STRING: &str = "Not a valid string.";
pub const BLANK: &str = "This field may not be blank.";

/// A message that passed validation, reduced to the fields we persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedMessage {
    pub role: String,
    pub content: String,
}

pub fn validate_message(payload: &Payload) -> Result<ValidatedMessage, FieldErrors> {
    let mut errors = FieldErrors::new();
    let role = required_text(payload, "role", &mut errors);
    let content = required_text(payload, "content", &mut errors);

    match (role, content) {
        (Some(role), Some(content)) => Ok(ValidatedMessage { role, content }),
        _ => Err(errors),
    }
}

fn required_text(payload: &Payload, field: &str, errors: &mut FieldErrors) -> Option<String> {
    match payload.get(field) {
        None | Some(Value::Null) => {
            errors.add(field, REQUIRED);
            None
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                errors.add(field, BLANK);
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            errors.add(field, NOT_A_STRING);
            None
        }
    }
}
