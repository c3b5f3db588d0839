use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sidecar_core::ServicesConfig;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SIDECAR_CONFIG";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the services configuration.
    ///
    /// Lookup order: `explicit`, `$SIDECAR_CONFIG`, the project config, the
    /// user config. The first candidate that applies wins; with none, the
    /// defaults are used. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<ServicesConfig> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from_path(Path::new(&path));
        }

        for path in [Self::project_config_path(), Self::user_config_path()] {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(ServicesConfig::default())
    }

    /// Get project config path
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".sidecar/config.toml")
    }

    /// Get user config path (~/.config/sidecar/config.toml or XDG equivalent)
    pub fn user_config_path() -> PathBuf {
        sidecar_paths::config_dir().join("config.toml")
    }

    /// Load config from a specific file
    pub fn load_from_path(path: &Path) -> Result<ServicesConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ServicesConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}
