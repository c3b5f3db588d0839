//! Helper binaries launched in the background at startup.
//!
//! Binaries come either from a bundled resource set (written to the user
//! cache directory) or from a local directory. Startup and cleanup are best
//! effort: one failing binary never blocks the others, and both operations
//! return an aggregated report.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BinariesConfig;
use crate::error::{Error, Result};
use crate::installer::set_mode;
use crate::platform::Platform;
use crate::supervisor::{OutputTarget, ProcessSpec, ProcessSupervisor, StopOutcome};

/// Source of bundled binary contents, keyed by binary name.
pub trait BundledBinaries: Send + Sync {
    fn get(&self, name: &str) -> Option<&[u8]>;
}

/// Bundle backed by `include_bytes!` data.
#[derive(Debug, Clone, Default)]
pub struct StaticBundle {
    binaries: HashMap<String, &'static [u8]>,
}

impl StaticBundle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.binaries.insert(name.into(), bytes);
        self
    }
}

impl BundledBinaries for StaticBundle {
    fn get(&self, name: &str) -> Option<&[u8]> {
        self.binaries.get(name).copied()
    }
}

/// Where binaries are taken from.
#[derive(Clone)]
pub enum BinarySource {
    /// Written from the bundle into the binary directory before launch.
    Embedded(Arc<dyn BundledBinaries>),
    /// Expected to exist in the binary directory already.
    Local,
}

impl fmt::Debug for BinarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded(_) => write!(f, "Embedded"),
            Self::Local => write!(f, "Local"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedBinary {
    pub name: String,
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of [`BinaryManager::start_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct StartReport {
    pub started: Vec<StartedBinary>,
    pub failed: Vec<BinaryFailure>,
    /// Not attempted because startup was cancelled.
    pub skipped: Vec<String>,
}

/// Outcome of [`BinaryManager::cleanup`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub killed: Vec<String>,
    pub already_exited: Vec<String>,
    pub failed: Vec<BinaryFailure>,
}

/// Launches and tracks helper binaries.
#[derive(Debug)]
pub struct BinaryManager {
    source: BinarySource,
    bin_dir: PathBuf,
    startup_order: Vec<String>,
    platform: Platform,
    running: Mutex<Vec<ProcessSupervisor>>,
}

impl BinaryManager {
    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the feature is disabled or the startup
    /// order is empty, and [`Error::Io`] if the binary directory cannot be
    /// prepared.
    pub fn from_config(config: &BinariesConfig, bundle: Arc<dyn BundledBinaries>) -> Result<Self> {
        if !config.enabled {
            return Err(Error::Config("binary management is disabled".into()));
        }
        if config.startup_order.is_empty() {
            return Err(Error::Config("binary startup order is empty".into()));
        }

        let (source, bin_dir) = if config.use_embedded {
            let dir = sidecar_paths::binary_cache_dir();
            std::fs::create_dir_all(&dir)?;
            (BinarySource::Embedded(bundle), dir)
        } else {
            let dir = if config.bin_path.is_absolute() {
                config.bin_path.clone()
            } else {
                std::env::current_dir()?.join(&config.bin_path)
            };
            (BinarySource::Local, dir)
        };

        info!(
            mode = ?source,
            dir = %bin_dir.display(),
            count = config.startup_order.len(),
            "Binary manager configured"
        );
        Ok(Self::new(source, bin_dir, config.startup_order.clone()))
    }

    /// Build with an explicit source and directory.
    pub fn new(source: BinarySource, bin_dir: impl Into<PathBuf>, startup_order: Vec<String>) -> Self {
        Self {
            source,
            bin_dir: bin_dir.into(),
            startup_order,
            platform: Platform::current(),
            running: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Launch every binary in startup order.
    ///
    /// Stops launching (already started binaries keep running) once `cancel`
    /// fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBinariesStarted`] if not a single binary started.
    pub async fn start_all(&self, cancel: &CancellationToken) -> Result<StartReport> {
        let mut report = StartReport::default();

        for name in &self.startup_order {
            if cancel.is_cancelled() {
                report.skipped.push(name.clone());
                continue;
            }
            match self.start_one(name).await {
                Ok(pid) => report.started.push(StartedBinary {
                    name: name.clone(),
                    pid,
                }),
                Err(e) => {
                    warn!(binary = %name, error = %e, "Failed to start binary");
                    report.failed.push(BinaryFailure {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.skipped.is_empty() {
            info!(skipped = report.skipped.len(), "Binary startup cancelled");
        }
        if report.started.is_empty() {
            return Err(Error::NoBinariesStarted(report));
        }

        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "Binaries started"
        );
        Ok(report)
    }

    async fn prepare(&self, name: &str) -> Result<PathBuf> {
        let path = self.platform.executable_path(&self.bin_dir, name);

        match self.source {
            BinarySource::Embedded(ref bundle) => {
                let bytes = bundle
                    .get(name)
                    .ok_or_else(|| Error::NotBundled(name.to_string()))?;
                tokio::fs::write(&path, bytes).await?;
                set_mode(&path, 0o755)?;
            }
            BinarySource::Local => {
                if !path.is_file() {
                    return Err(Error::BinaryMissing(path));
                }
                if let Err(e) = set_mode(&path, 0o755) {
                    warn!(path = %path.display(), error = %e, "Failed to set executable permission");
                }
            }
        }

        Ok(path)
    }

    async fn start_one(&self, name: &str) -> Result<u32> {
        let path = self.prepare(name).await?;
        let supervisor = ProcessSupervisor::new(name);
        let spec = ProcessSpec::new(path)
            .current_dir(&self.bin_dir)
            .output(OutputTarget::Inherit);
        let pid = supervisor.start_process(spec).await?;
        self.running.lock().await.push(supervisor);
        Ok(pid)
    }

    /// Force-stop every binary this manager started.
    pub async fn cleanup(&self) -> CleanupReport {
        let supervisors: Vec<ProcessSupervisor> = self.running.lock().await.drain(..).collect();
        let mut report = CleanupReport::default();
        if supervisors.is_empty() {
            return report;
        }

        let outcomes = join_all(supervisors.iter().map(|s| s.stop_process())).await;
        for (supervisor, outcome) in supervisors.iter().zip(outcomes) {
            let name = supervisor.name().to_string();
            match outcome {
                Ok(StopOutcome::Exited) => report.killed.push(name),
                Ok(StopOutcome::Orphaned { pid }) => report.failed.push(BinaryFailure {
                    name,
                    error: format!("pid {pid} did not exit after kill"),
                }),
                Err(Error::NotRunning(_)) => report.already_exited.push(name),
                Err(e) => {
                    warn!(binary = %name, error = %e, "Failed to kill binary");
                    report.failed.push(BinaryFailure {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            killed = report.killed.len(),
            already_exited = report.already_exited.len(),
            failed = report.failed.len(),
            "Binary cleanup finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(order: &[&str]) -> BinariesConfig {
        BinariesConfig {
            enabled: true,
            startup_order: order.iter().map(|s| s.to_string()).collect(),
            ..BinariesConfig::default()
        }
    }

    #[test]
    fn disabled_config_is_rejected() {
        let config = BinariesConfig::default();
        let result = BinaryManager::from_config(&config, Arc::new(StaticBundle::new()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn empty_order_is_rejected() {
        let result = BinaryManager::from_config(&enabled(&[]), Arc::new(StaticBundle::new()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn local_bin_path_is_made_absolute() {
        let manager =
            BinaryManager::from_config(&enabled(&["helper"]), Arc::new(StaticBundle::new()))
                .unwrap();
        assert!(manager.bin_dir().is_absolute());
        assert!(manager.bin_dir().ends_with("bin"));
    }

    #[tokio::test]
    async fn cleanup_with_nothing_started_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BinaryManager::new(BinarySource::Local, dir.path(), vec!["a".into()]);
        let report = manager.cleanup().await;
        assert!(report.killed.is_empty());
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn nothing_started_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BinaryManager::new(
            BinarySource::Local,
            dir.path(),
            vec!["missing-a".into(), "missing-b".into()],
        );

        let result = manager.start_all(&CancellationToken::new()).await;
        let Err(Error::NoBinariesStarted(report)) = result else {
            panic!("expected NoBinariesStarted");
        };
        assert_eq!(report.failed.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_startup_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BinaryManager::new(BinarySource::Local, dir.path(), vec!["a".into()]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = manager.start_all(&cancel).await;
        let Err(Error::NoBinariesStarted(report)) = result else {
            panic!("expected NoBinariesStarted");
        };
        assert_eq!(report.skipped, vec!["a".to_string()]);
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        const SLEEPER: &[u8] = b"#!/bin/sh\nexec sleep 30\n";

        #[tokio::test]
        async fn one_failure_does_not_block_others() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("helper"), SLEEPER).unwrap();
            let manager = BinaryManager::new(
                BinarySource::Local,
                dir.path(),
                vec!["missing".into(), "helper".into()],
            );

            let report = manager.start_all(&CancellationToken::new()).await.unwrap();
            assert_eq!(report.started.len(), 1);
            assert_eq!(report.started[0].name, "helper");
            assert_eq!(report.failed.len(), 1);
            assert_eq!(report.failed[0].name, "missing");

            let cleanup = manager.cleanup().await;
            assert_eq!(cleanup.killed, vec!["helper".to_string()]);

            let again = manager.cleanup().await;
            assert!(again.killed.is_empty());
        }

        #[tokio::test]
        async fn embedded_binaries_are_written_executable() {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let bundle = StaticBundle::new().with("bundled", SLEEPER);
            let manager = BinaryManager::new(
                BinarySource::Embedded(Arc::new(bundle)),
                dir.path(),
                vec!["bundled".into(), "not-bundled".into()],
            );

            let report = manager.start_all(&CancellationToken::new()).await.unwrap();
            assert_eq!(report.started.len(), 1);
            assert!(report.failed[0].error.contains("not bundled"));

            let mode = std::fs::metadata(dir.path().join("bundled"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o755, 0o755);

            manager.cleanup().await;
        }
    }
}
