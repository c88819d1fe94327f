//! Layered configuration for the parley server.
//!
//! Sources, lowest to highest priority: compiled defaults, a JSON settings
//! file, then `PARLEY_`-prefixed environment variables.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{BlobSettings, LoggingSettings, ParleySettings, ServerSettings, StoreSettings};
