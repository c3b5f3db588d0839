//! XDG Base Directory paths for sidecar.
//!
//! Services, helper binaries and the CLI config all live under XDG paths
//! rather than platform-native ones, so a desktop shell and the CLI agree on
//! where things were installed.

use std::path::PathBuf;

const APP_DIR: &str = "sidecar";

/// Get the sidecar config directory.
///
/// Returns `$XDG_CONFIG_HOME/sidecar` if set, otherwise `~/.config/sidecar`.
///
/// # Examples
///
/// ```
/// use sidecar_paths::config_dir;
///
/// let config_file = config_dir().join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the sidecar data directory.
///
/// Returns `$XDG_DATA_HOME/sidecar` if set, otherwise `~/.local/share/sidecar`.
/// Downloaded services are installed below this directory.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// Get the sidecar cache directory.
///
/// Returns `$XDG_CACHE_HOME/sidecar` if set, otherwise `~/.cache/sidecar`.
pub fn cache_dir() -> PathBuf {
    xdg_dir("XDG_CACHE_HOME", ".cache")
}

/// Default install directory for a downloadable service.
///
/// # Examples
///
/// ```
/// use sidecar_paths::service_dir;
///
/// assert!(service_dir("qdrant").ends_with("services/qdrant"));
/// ```
pub fn service_dir(name: &str) -> PathBuf {
    data_dir().join("services").join(name)
}

/// Directory bundled helper binaries are extracted into.
pub fn binary_cache_dir() -> PathBuf {
    cache_dir().join("bin")
}

fn xdg_dir(var: &str, home_relative: &str) -> PathBuf {
    if let Ok(base) = std::env::var(var)
        && !base.is_empty()
    {
        PathBuf::from(base).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(home_relative).join(APP_DIR)
    } else {
        PathBuf::from(home_relative).join(APP_DIR)
    }
}
