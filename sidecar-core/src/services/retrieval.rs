//! Retrieval server (go-rag).

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::config_file;
use super::managed::{ManagedService, ServiceProfile};
use crate::config::{ServiceConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::health::probe_tcp;
use crate::platform::{GO_NAMING, NamingTable};
use crate::supervisor::ProcessSpec;

/// Environment variable telling the retrieval server where its config lives.
pub const CONFIG_PATH_ENV: &str = "SIDECAR_CONFIG_PATH";

/// Config file the retrieval server reads from its install directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalProfile;

/// Lifecycle manager for the retrieval server.
pub type RetrievalServer = ManagedService<RetrievalProfile>;

/// Value exported as [`CONFIG_PATH_ENV`]: configured, else inherited, else the cwd.
fn config_path_value(config: &ServiceConfig) -> OsString {
    if let Some(ref path) = config.config_path {
        return path.clone().into_os_string();
    }
    if let Some(value) = std::env::var_os(CONFIG_PATH_ENV)
        && !value.is_empty()
    {
        return value;
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .into_os_string()
}

#[async_trait]
impl ServiceProfile for RetrievalProfile {
    fn name(&self) -> &'static str {
        "go-rag"
    }

    fn naming(&self) -> NamingTable {
        GO_NAMING
    }

    fn configure(
        &self,
        spec: ProcessSpec,
        config: &ServiceConfig,
        cancel: &CancellationToken,
    ) -> ProcessSpec {
        spec.env(CONFIG_PATH_ENV, config_path_value(config))
            .cancel_on(cancel.clone())
    }

    async fn check_health(
        &self,
        config: &ServiceConfig,
        timeouts: &TimeoutConfig,
        _client: &reqwest::Client,
    ) -> Result<()> {
        probe_tcp(&config.health_address(), timeouts.probe).await
    }
}

impl ManagedService<RetrievalProfile> {
    /// Create a retrieval server manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the snapshot is incomplete.
    pub fn retrieval(config: ServiceConfig, timeouts: TimeoutConfig) -> Result<Self> {
        Self::new(RetrievalProfile, config, timeouts)
    }

    /// `{install}/config.yaml`.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.config().install_path.join(CONFIG_FILE_NAME)
    }

    fn ensure_installed(&self) -> Result<()> {
        if self.is_installed() {
            Ok(())
        } else {
            Err(Error::NotInstalled(self.name().to_string()))
        }
    }

    /// Read the server's config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInstalled`] or [`Error::ConfigFile`].
    pub async fn read_config(&self) -> Result<String> {
        self.ensure_installed()?;
        let path = self.config_file_path();
        tokio::task::spawn_blocking(move || config_file::read(&path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Replace the server's config file, restoring the old one on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInstalled`] or [`Error::ConfigFile`].
    pub async fn save_config(&self, content: String) -> Result<()> {
        self.ensure_installed()?;
        let path = self.config_file_path();
        tokio::task::spawn_blocking(move || config_file::replace(&path, &content))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}
