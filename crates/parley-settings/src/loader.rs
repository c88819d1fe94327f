//! Settings loading.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If the settings file exists, merge its values over the defaults
//! 3. Apply `PARLEY_*` environment overrides (`__` separates sections,
//!    e.g. `PARLEY_SERVER__PORT=9000`)

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use tracing::debug;

use crate::errors::Result;
use crate::types::{parley_home, ParleySettings};

pub const ENV_PREFIX: &str = "PARLEY_";

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    parley_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file means defaults. A malformed file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let settings: ParleySettings = figment(path).extract().map_err(Box::new)?;
    settings.validate()?;
    Ok(settings)
}

fn figment(path: &Path) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(ParleySettings::default()));

    if path.exists() {
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file(path));
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}
