//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! # Environment Overrides
//!
//! - `GNOSIS_DATA_DIR` overrides [`data_dir`]
//! - `GNOSIS_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root (feedback store snapshot).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GNOSIS_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("gnosis"))
        .unwrap_or_else(|| PathBuf::from("/tmp/gnosis-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GNOSIS_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("gnosis"))
        .unwrap_or_else(|| PathBuf::from("/tmp/gnosis-config"))
}

/// Default config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default trust policy file (`config_dir()/source_trust.toml`).
#[must_use]
pub fn policy_file() -> PathBuf {
    config_dir().join("source_trust.toml")
}

/// Default key-value store snapshot (`data_dir()/store.json`).
#[must_use]
pub fn store_file() -> PathBuf {
    data_dir().join("store.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_nonempty() {
        assert!(!data_dir().as_os_str().is_empty());
    }

    #[test]
    fn files_live_under_their_dirs() {
        assert!(config_file().starts_with(config_dir()));
        assert!(policy_file().starts_with(config_dir()));
        assert!(store_file().starts_with(data_dir()));
    }

    #[test]
    fn file_names() {
        assert!(config_file().ends_with("config.toml"));
        assert!(store_file().ends_with("store.json"));
    }
}
