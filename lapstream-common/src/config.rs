//! Configuration file discovery
//!
//! Config files are optional. Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config dir>/lapstream/config.toml`)
//! 4. System-wide file (`/etc/lapstream/config.toml`, Linux only)
//!
//! A missing file is not an error. Callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "lapstream";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LAPSTREAM_CONFIG";

/// Resolve the config file path following the priority order.
///
/// An explicit path (CLI or environment) is returned even if it does not exist,
/// so the caller can report it. Discovered default locations are only returned
/// when they exist.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: platform locations
    default_config_locations()
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Platform default config file locations, most specific first
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }

    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc").join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }

    locations
}

/// Parse a TOML config file into `T`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}

/// Load a config file if one resolves, otherwise return `T::default()`.
///
/// A resolved file that does not exist only produces a warning. A file that
/// exists but fails to parse is an error: silently ignoring a typo would hide
/// the operator's intent.
pub fn load_or_default<T>(cli_arg: Option<&Path>, env_var_name: &str) -> Result<(T, Option<PathBuf>)>
where
    T: DeserializeOwned + Default,
{
    match resolve_config_path(cli_arg, env_var_name) {
        Some(path) if path.exists() => {
            debug!("Loading config file {}", path.display());
            let config = load_toml(&path)?;
            Ok((config, Some(path)))
        }
        Some(path) => {
            warn!("Config file {} not found, using built-in defaults", path.display());
            Ok((T::default(), None))
        }
        None => {
            debug!("No config file found, using built-in defaults");
            Ok((T::default(), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml")), "LAPSTREAM_UNUSED_VAR");
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    #[test]
    fn test_default_locations_end_with_config_file() {
        for location in default_config_locations() {
            assert!(location.ends_with(Path::new(APP_DIR_NAME).join(CONFIG_FILE_NAME)));
        }
    }
}
