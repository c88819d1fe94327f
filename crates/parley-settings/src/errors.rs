//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A source could not be read or did not match the settings shape.
    #[error("failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),
    /// A settings value was invalid (e.g., out of range).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("max_send_queue must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "invalid settings value: max_send_queue must be > 0"
        );
    }

    #[test]
    fn figment_error_converts() {
        let err: SettingsError = Box::new(figment::Error::from("boom".to_string())).into();
        assert!(matches!(err, SettingsError::Load(_)));
        assert!(err.to_string().contains("boom"));
    }
}
