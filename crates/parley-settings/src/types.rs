//! Settings shapes. Every field has a default so partial files are fine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleySettings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub blob: BlobSettings,
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Reject values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.max_send_queue must be greater than 0".into(),
            ));
        }
        if self.server.broadcast_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.broadcast_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    /// 0 lets the OS pick a port.
    pub port: u16,
    /// Outbound frames buffered per client before new ones are dropped.
    pub max_send_queue: usize,
    /// Upper bound on one store insert. 0 disables the bound.
    pub persist_timeout_ms: u64,
    /// Events buffered per conversation for slow subscribers.
    pub broadcast_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9091,
            max_send_queue: 256,
            persist_timeout_ms: 10_000,
            broadcast_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub db_path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: parley_home().join("database").join("messages.db"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobSettings {
    pub bucket_name: String,
    /// File holding an OAuth bearer token for the bucket.
    pub credentials: Option<PathBuf>,
    pub project_id: Option<String>,
    pub endpoint: String,
}

impl Default for BlobSettings {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            credentials: None,
            project_id: None,
            endpoint: "https://storage.googleapis.com".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
            modules: BTreeMap::new(),
        }
    }
}

/// `~/.parley`, falling back to `/tmp/.parley` without a home directory.
pub fn parley_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".parley")
}
