//! Configuration snapshots handed to managers at construction.
//!
//! Managers never read configuration on their own; the host loads it once
//! and passes the relevant section down. Fields that are missing from a
//! config file fall back to per-service defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default port of the retrieval server HTTP API.
pub const DEFAULT_RETRIEVAL_PORT: u16 = 8000;

/// Default port of the vector database HTTP API.
pub const DEFAULT_VECTOR_DB_PORT: u16 = 6333;

const RETRIEVAL_NAME: &str = "go-rag";
const RETRIEVAL_DOWNLOAD_URL: &str = "https://github.com/wangle201210/go-rag/releases/latest/download";
const VECTOR_DB_NAME: &str = "qdrant";
const VECTOR_DB_DOWNLOAD_URL: &str = "https://github.com/qdrant/qdrant/releases/latest/download";

/// Configuration for one downloadable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Whether the service may be downloaded and started at all.
    pub enabled: bool,

    /// Start the service when the host starts (if installed).
    pub auto_start: bool,

    /// Directory the archive is extracted into; also the working directory.
    pub install_path: PathBuf,

    /// Base URL the platform-specific artifact name is appended to.
    pub download_url: String,

    /// Port the service listens on, used for health probes.
    pub port: u16,

    /// Executable name inside the install directory (without `.exe`).
    pub binary_name: String,

    /// Prefix of the release artifact file name.
    pub artifact_prefix: String,

    /// Value exported to the child as its config path, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Defaults for the retrieval server.
    #[must_use]
    pub fn retrieval() -> Self {
        Self {
            enabled: false,
            auto_start: false,
            install_path: sidecar_paths::service_dir(RETRIEVAL_NAME),
            download_url: RETRIEVAL_DOWNLOAD_URL.to_string(),
            port: DEFAULT_RETRIEVAL_PORT,
            binary_name: RETRIEVAL_NAME.to_string(),
            artifact_prefix: RETRIEVAL_NAME.to_string(),
            config_path: None,
        }
    }

    /// Defaults for the vector database.
    #[must_use]
    pub fn vector_db() -> Self {
        Self {
            enabled: false,
            auto_start: false,
            install_path: sidecar_paths::service_dir(VECTOR_DB_NAME),
            download_url: VECTOR_DB_DOWNLOAD_URL.to_string(),
            port: DEFAULT_VECTOR_DB_PORT,
            binary_name: VECTOR_DB_NAME.to_string(),
            artifact_prefix: VECTOR_DB_NAME.to_string(),
            config_path: None,
        }
    }

    /// Enable or disable the service.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the auto-start flag.
    #[must_use]
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Use a custom install directory.
    #[must_use]
    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_path = path.into();
        self
    }

    /// Use a custom download base URL.
    #[must_use]
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    /// Use a custom port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use a custom executable name.
    #[must_use]
    pub fn with_binary_name(mut self, name: impl Into<String>) -> Self {
        self.binary_name = name.into();
        self
    }

    /// Address used by the TCP health probe.
    #[must_use]
    pub fn health_address(&self) -> String {
        format!("localhost:{}", self.port)
    }

    /// Reject snapshots a manager cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty install path, binary name or port.
    pub fn validate(&self) -> Result<()> {
        if self.install_path.as_os_str().is_empty() {
            return Err(Error::Config("install path not configured".into()));
        }
        if self.binary_name.is_empty() {
            return Err(Error::Config("binary name not configured".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("service port not configured".into()));
        }
        Ok(())
    }
}

/// Bounds for the blocking parts of the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// How long Stop waits for the killed process to exit.
    #[serde(default = "default_stop", with = "humantime_serde")]
    pub stop: Duration,

    /// How long a start waits for the service to become healthy.
    #[serde(default = "default_health_wait", with = "humantime_serde")]
    pub health_wait: Duration,

    /// Interval between health probes.
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub health_interval: Duration,

    /// Connect timeout of a single probe.
    #[serde(default = "default_probe", with = "humantime_serde")]
    pub probe: Duration,
}

fn default_stop() -> Duration {
    Duration::from_secs(5)
}

fn default_health_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_probe() -> Duration {
    Duration::from_secs(3)
}

impl TimeoutConfig {
    /// Reject bounds the health loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero probe interval or probe timeout.
    pub fn validate(&self) -> Result<()> {
        if self.health_interval.is_zero() {
            return Err(Error::Config("health_interval must be greater than zero".into()));
        }
        if self.probe.is_zero() {
            return Err(Error::Config("probe timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stop: default_stop(),
            health_wait: default_health_wait(),
            health_interval: default_health_interval(),
            probe: default_probe(),
        }
    }
}

/// Configuration of bundled helper binaries launched at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinariesConfig {
    /// Whether helper binaries are launched at all.
    #[serde(default)]
    pub enabled: bool,

    /// Extract from the bundled resource set instead of using `bin_path`.
    #[serde(default)]
    pub use_embedded: bool,

    /// Directory holding the binaries in local mode.
    #[serde(default = "default_bin_path")]
    pub bin_path: PathBuf,

    /// Binaries to launch, in order.
    #[serde(default)]
    pub startup_order: Vec<String>,
}

fn default_bin_path() -> PathBuf {
    PathBuf::from("./bin")
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            use_embedded: false,
            bin_path: default_bin_path(),
            startup_order: Vec::new(),
        }
    }
}

/// Everything the service subsystem needs, as one immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawServicesConfig")]
pub struct ServicesConfig {
    pub retrieval: ServiceConfig,
    pub vector_db: ServiceConfig,
    pub binaries: BinariesConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            retrieval: ServiceConfig::retrieval(),
            vector_db: ServiceConfig::vector_db(),
            binaries: BinariesConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Service section as stored in TOML (optional fields so defaults can fill the gaps)
#[derive(Debug, Clone, Default, Deserialize)]
struct RawServiceConfig {
    enabled: Option<bool>,
    auto_start: Option<bool>,
    install_path: Option<PathBuf>,
    download_url: Option<String>,
    port: Option<u16>,
    binary_name: Option<String>,
    artifact_prefix: Option<String>,
    config_path: Option<PathBuf>,
}

impl RawServiceConfig {
    fn finalize(self, defaults: ServiceConfig) -> ServiceConfig {
        ServiceConfig {
            enabled: self.enabled.unwrap_or(defaults.enabled),
            auto_start: self.auto_start.unwrap_or(defaults.auto_start),
            install_path: self.install_path.unwrap_or(defaults.install_path),
            download_url: self.download_url.unwrap_or(defaults.download_url),
            port: self.port.unwrap_or(defaults.port),
            binary_name: self.binary_name.unwrap_or(defaults.binary_name),
            artifact_prefix: self.artifact_prefix.unwrap_or(defaults.artifact_prefix),
            config_path: self.config_path.or(defaults.config_path),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawServicesConfig {
    #[serde(default)]
    retrieval: RawServiceConfig,
    #[serde(default)]
    vector_db: RawServiceConfig,
    #[serde(default)]
    binaries: BinariesConfig,
    #[serde(default)]
    timeouts: TimeoutConfig,
}

impl From<RawServicesConfig> for ServicesConfig {
    fn from(raw: RawServicesConfig) -> Self {
        Self {
            retrieval: raw.retrieval.finalize(ServiceConfig::retrieval()),
            vector_db: raw.vector_db.finalize(ServiceConfig::vector_db()),
            binaries: raw.binaries,
            timeouts: raw.timeouts,
        }
    }
}
