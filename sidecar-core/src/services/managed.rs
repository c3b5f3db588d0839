//! A downloadable service process: install state, spawn contract and health.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ServiceConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::installer::{ArchiveInstaller, InstallRequest};
use crate::platform::{NamingTable, Platform, artifact_url};
use crate::progress::ProgressReporter;
use crate::supervisor::{
    LifecycleState, OutputTarget, ProcessSpec, ProcessState, ProcessSupervisor, StatusSnapshot,
    StopOutcome,
};

/// What differs between concrete services.
#[async_trait]
pub trait ServiceProfile: Send + Sync + 'static {
    /// Name used in logs, errors and events.
    fn name(&self) -> &'static str;

    /// Host-to-vendor naming of the release artifacts.
    fn naming(&self) -> NamingTable;

    /// Log file name inside the install directory.
    fn log_file(&self) -> String {
        format!("{}.log", self.name())
    }

    /// Add service-specific environment or cancellation to the base spec.
    fn configure(
        &self,
        spec: ProcessSpec,
        _config: &ServiceConfig,
        _cancel: &CancellationToken,
    ) -> ProcessSpec {
        spec
    }

    /// One health probe against a running instance.
    async fn check_health(
        &self,
        config: &ServiceConfig,
        timeouts: &TimeoutConfig,
        client: &reqwest::Client,
    ) -> Result<()>;
}

/// Lifecycle manager for one downloadable service.
#[derive(Debug)]
pub struct ManagedService<P> {
    profile: P,
    config: ServiceConfig,
    timeouts: TimeoutConfig,
    platform: Platform,
    supervisor: ProcessSupervisor,
    installer: ArchiveInstaller,
    client: reqwest::Client,
}

impl<P: ServiceProfile> ManagedService<P> {
    /// Create a manager from an immutable config snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the snapshot is incomplete or a timeout is zero.
    pub fn new(profile: P, config: ServiceConfig, timeouts: TimeoutConfig) -> Result<Self> {
        config.validate()?;
        timeouts.validate()?;
        let supervisor = ProcessSupervisor::new(profile.name()).with_stop_timeout(timeouts.stop);
        Ok(Self {
            profile,
            config,
            timeouts,
            platform: Platform::current(),
            supervisor,
            installer: ArchiveInstaller::new(),
            client: reqwest::Client::new(),
        })
    }

    /// Resolve artifacts and binaries for another platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Use a preconfigured HTTP client for downloads and probes.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.installer = ArchiveInstaller::with_client(client.clone());
        self.client = client;
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.profile.name()
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// `{install}/{binary}`, with `.exe` on Windows.
    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        self.platform
            .executable_path(&self.config.install_path, &self.config.binary_name)
    }

    /// Whether the binary exists at [`Self::binary_path`].
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.binary_path().is_file()
    }

    /// Release artifact file name for this platform.
    #[must_use]
    pub fn artifact_name(&self) -> String {
        self.profile
            .naming()
            .artifact_name(&self.config.artifact_prefix, self.platform)
    }

    /// Full download URL of the release artifact.
    #[must_use]
    pub fn download_url(&self) -> String {
        artifact_url(&self.config.download_url, &self.artifact_name())
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.config.install_path.join(self.profile.log_file())
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(Error::Disabled(self.name().to_string()))
        }
    }

    /// Download and install the service binary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disabled`] if the service is disabled, otherwise any
    /// installer error.
    pub async fn download(&self, progress: &ProgressReporter) -> Result<PathBuf> {
        self.ensure_enabled()?;

        let request = InstallRequest {
            url: self.download_url(),
            install_dir: self.config.install_path.clone(),
            archive_path: self.config.install_path.join(format!(
                "{}-download.{}",
                self.config.artifact_prefix,
                self.platform.archive_extension()
            )),
            binary_path: self.binary_path(),
        };

        info!(service = self.name(), url = %request.url, "Downloading {}", self.name());
        self.installer.install(&request, progress).await
    }

    /// Launch the installed binary; `cancel` is honoured only by profiles
    /// that tie their process to the host's lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disabled`], [`Error::NotInstalled`],
    /// [`Error::AlreadyRunning`] or [`Error::Spawn`].
    pub async fn start(&self, cancel: &CancellationToken) -> Result<u32> {
        self.ensure_enabled()?;
        if !self.is_installed() {
            return Err(Error::NotInstalled(self.name().to_string()));
        }

        let spec = ProcessSpec::new(self.binary_path())
            .current_dir(&self.config.install_path)
            .output(OutputTarget::AppendFile(self.log_path()));
        let spec = self.profile.configure(spec, &self.config, cancel);

        self.supervisor.start_process(spec).await
    }

    /// Stop the running process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] if nothing is running.
    pub async fn stop(&self) -> Result<StopOutcome> {
        self.supervisor.stop_process().await
    }

    pub async fn is_running(&self) -> bool {
        self.supervisor.is_running().await
    }

    pub async fn pid(&self) -> Option<u32> {
        self.supervisor.pid().await
    }

    pub async fn process_state(&self) -> ProcessState {
        self.supervisor.state().await
    }

    pub async fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::from_parts(self.is_installed(), self.supervisor.state().await)
    }

    /// One health probe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unhealthy`] if the probe fails.
    pub async fn check_health(&self) -> Result<()> {
        self.profile
            .check_health(&self.config, &self.timeouts, &self.client)
            .await
    }

    /// Poll the health probe until it succeeds or the configured wait elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HealthTimeout`] if the service never became healthy.
    pub async fn wait_for_health(&self) -> Result<()> {
        self.supervisor
            .wait_for_health(
                self.timeouts.health_wait,
                self.timeouts.health_interval,
                || self.check_health(),
            )
            .await
    }

    /// Installed/running/healthy snapshot.
    pub async fn status(&self) -> StatusSnapshot {
        self.supervisor
            .status(self.is_installed(), || self.check_health())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::GO_NAMING;

    #[derive(Debug)]
    struct FakeProfile;

    #[async_trait]
    impl ServiceProfile for FakeProfile {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn naming(&self) -> NamingTable {
            GO_NAMING
        }

        async fn check_health(
            &self,
            _config: &ServiceConfig,
            _timeouts: &TimeoutConfig,
            _client: &reqwest::Client,
        ) -> Result<()> {
            Err(Error::Unhealthy("fake is never healthy".into()))
        }
    }

    fn config(dir: &std::path::Path) -> ServiceConfig {
        ServiceConfig::retrieval()
            .with_enabled(true)
            .with_install_path(dir)
            .with_binary_name("fake")
            .with_download_url("http://example.invalid/releases/")
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = ManagedService::new(
            FakeProfile,
            ServiceConfig::retrieval().with_install_path(""),
            TimeoutConfig::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn new_rejects_zero_health_interval() {
        let dir = tempfile::tempdir().unwrap();
        let timeouts = TimeoutConfig {
            health_interval: std::time::Duration::ZERO,
            ..TimeoutConfig::default()
        };
        let result = ManagedService::new(FakeProfile, config(dir.path()), timeouts);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn paths_follow_install_dir_and_platform() {
        let dir = tempfile::tempdir().unwrap();
        let service = ManagedService::new(FakeProfile, config(dir.path()), TimeoutConfig::default())
            .unwrap()
            .with_platform(Platform {
                os: "windows",
                arch: "x86_64",
            });

        assert_eq!(service.binary_path(), dir.path().join("fake.exe"));
        assert_eq!(service.log_path(), dir.path().join("fake.log"));
        assert_eq!(
            service.download_url(),
            "http://example.invalid/releases/go-rag-windows-amd64.zip"
        );
    }

    #[tokio::test]
    async fn start_requires_install() {
        let dir = tempfile::tempdir().unwrap();
        let service =
            ManagedService::new(FakeProfile, config(dir.path()), TimeoutConfig::default()).unwrap();

        assert!(!service.is_installed());
        assert_eq!(
            service.lifecycle_state().await,
            LifecycleState::NotInstalled
        );
        let result = service.start(&CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::NotInstalled(_))));
    }

    #[tokio::test]
    async fn disabled_service_refuses_start_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let service = ManagedService::new(
            FakeProfile,
            config(dir.path()).with_enabled(false),
            TimeoutConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            service.start(&CancellationToken::new()).await,
            Err(Error::Disabled(_))
        ));
        assert!(matches!(
            service.download(&ProgressReporter::silent()).await,
            Err(Error::Disabled(_))
        ));
    }

    #[tokio::test]
    async fn stop_never_started_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let service =
            ManagedService::new(FakeProfile, config(dir.path()), TimeoutConfig::default()).unwrap();

        assert!(matches!(service.stop().await, Err(Error::NotRunning(_))));
    }

    #[tokio::test]
    async fn status_of_idle_service() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake"), b"").unwrap();
        let service = ManagedService::new(FakeProfile, config(dir.path()), TimeoutConfig::default())
            .unwrap()
            .with_platform(Platform {
                os: "linux",
                arch: "x86_64",
            });

        let status = service.status().await;
        assert!(status.installed);
        assert!(!status.running);
        assert!(!status.healthy);
        assert_eq!(service.lifecycle_state().await, LifecycleState::Installed);
    }
}
