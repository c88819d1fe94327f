use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name -> human-readable problems with that field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

/// Everything that can go wrong while handling one inbound frame.
///
/// None of these end the connection: each one is turned into an
/// `{"errors": ...}` frame on the same socket.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON")]
    InvalidJson,

    #[error("frame is not a JSON object")]
    InvalidPayload,

    #[error("validation failed: {0}")]
    ValidationFailed(FieldErrors),

    #[error("{0}")]
    Persistence(String),
}

impl ProtocolError {
    /// Short classification string for logging and wire codes.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::InvalidPayload => "invalid_payload",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Persistence(_) => "persistence_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        assert!(errors.is_empty());
        errors.add("role", "This field is required.");
        errors.add("content", "This field may not be blank.");
        errors.add("content", "second");

        assert_eq!(errors.get("role").unwrap().len(), 1);
        assert_eq!(errors.get("content").unwrap().len(), 2);
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["content", "role"]);
    }

    #[test]
    fn field_errors_serialize_as_map() {
        let mut errors = FieldErrors::new();
        errors.add("role", "This field is required.");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({"role": ["This field is required."]}));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ProtocolError::InvalidJson.error_kind(), "invalid_json");
        assert_eq!(ProtocolError::InvalidPayload.error_kind(), "invalid_payload");
        assert_eq!(
            ProtocolError::ValidationFailed(FieldErrors::new()).error_kind(),
            "validation_failed"
        );
        assert_eq!(
            ProtocolError::Persistence("disk full".into()).error_kind(),
            "persistence_error"
        );
    }

    #[test]
    fn persistence_display_is_the_cause() {
        let err = ProtocolError::Persistence("database is locked".into());
        assert_eq!(err.to_string(), "database is locked");
    }
}
