//! Error types for service lifecycle management.

use std::path::PathBuf;
use std::time::Duration;

use crate::binaries::StartReport;

/// Error type for sidecar operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The service is disabled in configuration.
    #[error("{0} is disabled in configuration")]
    Disabled(String),

    /// The service binary has not been downloaded yet.
    #[error("{0} is not installed, please download first")]
    NotInstalled(String),

    /// Start was called while the process is still alive.
    #[error("{0} is already running")]
    AlreadyRunning(String),

    /// Stop was called with no live process.
    #[error("{0} is not running")]
    NotRunning(String),

    /// The OS refused to spawn the process.
    #[error("failed to start {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Health polling gave up.
    #[error("timeout waiting for {name} to become healthy after {timeout:?}")]
    HealthTimeout { name: String, timeout: Duration },

    /// A single health probe failed.
    #[error("health check failed: {0}")]
    Unhealthy(String),

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Download endpoint answered with something other than 200.
    #[error("download of {url} failed with status: {status}")]
    DownloadStatus { url: String, status: String },

    /// The archive suffix is neither `.tar.gz`/`.tgz` nor `.zip`.
    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedArchive(PathBuf),

    /// The archive could not be decoded or contains an unsafe entry.
    #[error("failed to extract {}: {reason}", path.display())]
    Extract { path: PathBuf, reason: String },

    /// Extraction finished but the expected executable is absent.
    #[error("binary not found at {}", .0.display())]
    BinaryMissing(PathBuf),

    /// A helper binary is not part of the bundled resource set.
    #[error("binary {0} is not bundled with this build")]
    NotBundled(String),

    /// No helper binary could be launched.
    #[error("failed to start any binaries ({} attempted)", .0.failed.len())]
    NoBinariesStarted(StartReport),

    /// Reading or replacing a service config file failed.
    #[error("{action} config file {}: {source}", path.display())]
    ConfigFile {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Zip container error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Any other I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a bounded wait running out rather than a hard failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::HealthTimeout { .. })
    }
}

/// Result type alias for sidecar operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_name_the_service() {
        assert_eq!(
            Error::AlreadyRunning("qdrant".into()).to_string(),
            "qdrant is already running"
        );
        assert_eq!(
            Error::NotRunning("go-rag".into()).to_string(),
            "go-rag is not running"
        );
    }

    #[test]
    fn health_timeout_is_distinct_from_failures() {
        let timeout = Error::HealthTimeout {
            name: "qdrant".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(timeout.is_timeout());
        assert!(!Error::Unhealthy("refused".into()).is_timeout());
    }

    #[test]
    fn download_status_keeps_status_text() {
        let err = Error::DownloadStatus {
            url: "http://example.invalid/a.tar.gz".into(),
            status: "404 Not Found".into(),
        };
        assert!(err.to_string().ends_with("404 Not Found"));
    }
}
