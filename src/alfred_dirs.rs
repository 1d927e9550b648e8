//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! # Environment Overrides
//!
//! - `ALFRED_CONFIG_DIR` overrides [`config_dir`]
//! - `ALFRED_DATA_DIR` overrides [`data_dir`]

use std::path::PathBuf;

/// Application config directory, holding `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ALFRED_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("alfred"))
        .unwrap_or_else(|| PathBuf::from("/tmp/alfred-config"))
}

/// Application data directory, holding the remembered identity.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ALFRED_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("alfred"))
        .unwrap_or_else(|| PathBuf::from("/tmp/alfred-data"))
}

/// Default path of the TOML configuration file.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default path of the identity file.
#[must_use]
pub fn identity_file() -> PathBuf {
    data_dir().join("identity.json")
}
