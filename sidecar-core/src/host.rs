//! Host-facing orchestration of all managers.
//!
//! The host owns the retrieval server, the vector database and the helper
//! binaries. It adds what the individual managers do not know about:
//! dependency ordering (vector database before retrieval server), bounded
//! health waits after start, auto-start, ordered shutdown and a broadcast
//! stream of lifecycle events for a UI.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binaries::{BinaryManager, BundledBinaries};
use crate::config::ServicesConfig;
use crate::error::{Error, Result};
use crate::events::{ServiceEvent, ServiceEventKind, ServiceKind};
use crate::progress::ProgressReporter;
use crate::services::{RetrievalServer, VectorDb};
use crate::supervisor::{LifecycleState, StatusSnapshot, StopOutcome};

const EVENT_CAPACITY: usize = 256;

/// Where a UI can reach the retrieval server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalServerInfo {
    pub enabled: bool,
    pub url: String,
}

/// Owns every manager and emits [`ServiceEvent`]s.
#[derive(Debug)]
pub struct ServiceHost {
    config: ServicesConfig,
    retrieval: Option<RetrievalServer>,
    vector_db: Option<VectorDb>,
    binaries: Option<BinaryManager>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<ServiceEvent>,
}

impl ServiceHost {
    /// Build the managers for every enabled service.
    ///
    /// A helper-binary setup failure is logged and the host continues
    /// without helper binaries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an enabled service has an incomplete
    /// configuration.
    pub fn new(config: ServicesConfig, bundle: Arc<dyn BundledBinaries>) -> Result<Self> {
        let retrieval = if config.retrieval.enabled {
            Some(RetrievalServer::retrieval(
                config.retrieval.clone(),
                config.timeouts.clone(),
            )?)
        } else {
            None
        };

        let vector_db = if config.vector_db.enabled {
            Some(VectorDb::vector_db(
                config.vector_db.clone(),
                config.timeouts.clone(),
            )?)
        } else {
            None
        };

        let binaries = if config.binaries.enabled {
            match BinaryManager::from_config(&config.binaries, bundle) {
                Ok(manager) => Some(manager),
                Err(e) => {
                    warn!(error = %e, "Failed to set up helper binaries, continuing without them");
                    None
                }
            }
        } else {
            debug!("Helper binaries disabled");
            None
        };

        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config,
            retrieval,
            vector_db,
            binaries,
            cancel: CancellationToken::new(),
            event_tx,
        })
    }

    /// Tie cancellation-aware processes (the retrieval server) to `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &ServicesConfig {
        &self.config
    }

    fn emit(&self, service: ServiceKind, kind: ServiceEventKind) {
        // No subscribers is fine
        let _ = self.event_tx.send(ServiceEvent::new(service, kind));
    }

    fn retrieval_server(&self) -> Result<&RetrievalServer> {
        self.retrieval
            .as_ref()
            .ok_or_else(|| Error::Disabled("go-rag".into()))
    }

    fn vector_database(&self) -> Result<&VectorDb> {
        self.vector_db
            .as_ref()
            .ok_or_else(|| Error::Disabled("qdrant".into()))
    }

    /// Whether the service is enabled in configuration.
    #[must_use]
    pub fn is_enabled(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::Retrieval => self.retrieval.is_some(),
            ServiceKind::VectorDb => self.vector_db.is_some(),
        }
    }

    /// Whether the service binary is installed.
    #[must_use]
    pub fn is_installed(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::Retrieval => self.retrieval.as_ref().is_some_and(|s| s.is_installed()),
            ServiceKind::VectorDb => self.vector_db.as_ref().is_some_and(|s| s.is_installed()),
        }
    }

    async fn is_running(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::Retrieval => match self.retrieval {
                Some(ref s) => s.is_running().await,
                None => false,
            },
            ServiceKind::VectorDb => match self.vector_db {
                Some(ref s) => s.is_running().await,
                None => false,
            },
        }
    }

    /// Launch helper binaries, then auto-start installed services.
    ///
    /// Failures are logged, never returned.
    pub async fn startup(&self) {
        if let Some(ref binaries) = self.binaries {
            match binaries.start_all(&self.cancel).await {
                Ok(report) => info!(started = report.started.len(), "Helper binaries started"),
                Err(e) => warn!(error = %e, "Failed to start helper binaries"),
            }
        }

        for kind in ServiceKind::ALL {
            let auto_start = match kind {
                ServiceKind::Retrieval => self.config.retrieval.auto_start,
                ServiceKind::VectorDb => self.config.vector_db.auto_start,
            };
            if !self.is_enabled(kind) || !auto_start {
                continue;
            }
            if !self.is_installed(kind) {
                info!(service = %kind, "Auto-start skipped, not installed yet");
                continue;
            }
            if self.is_running(kind).await {
                continue;
            }
            info!(service = %kind, "Auto-starting");
            if let Err(e) = self.start(kind).await {
                warn!(service = %kind, error = %e, "Auto-start failed");
            }
        }
    }

    /// Download and install a service, emitting download events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disabled`] or any installer error.
    pub async fn download(&self, kind: ServiceKind) -> Result<PathBuf> {
        self.emit(kind, ServiceEventKind::DownloadStarted);

        let tx = self.event_tx.clone();
        let reporter = ProgressReporter::new(move |progress| {
            let _ = tx.send(ServiceEvent::new(
                kind,
                ServiceEventKind::DownloadProgress {
                    progress: progress.clone(),
                },
            ));
        });

        let result = match kind {
            ServiceKind::Retrieval => match self.retrieval_server() {
                Ok(s) => s.download(&reporter).await,
                Err(e) => Err(e),
            },
            ServiceKind::VectorDb => match self.vector_database() {
                Ok(s) => s.download(&reporter).await,
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(ref path) => {
                info!(service = %kind, binary = %path.display(), "Download complete");
                self.emit(kind, ServiceEventKind::DownloadComplete);
            }
            Err(ref e) => {
                warn!(service = %kind, error = %e, "Download failed");
                self.emit(
                    kind,
                    ServiceEventKind::DownloadFailed {
                        error: e.to_string(),
                    },
                );
            }
        }
        result
    }

    /// Start a service and wait until it is healthy.
    ///
    /// Starting the retrieval server first brings up the vector database when
    /// it is enabled and not running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disabled`], [`Error::NotInstalled`] (also for a missing
    /// vector database), [`Error::AlreadyRunning`], [`Error::Spawn`] or
    /// [`Error::HealthTimeout`].
    pub async fn start(&self, kind: ServiceKind) -> Result<u32> {
        let result = match kind {
            ServiceKind::VectorDb => self.start_vector_db().await,
            ServiceKind::Retrieval => self.start_retrieval().await,
        };

        match result {
            Ok(pid) => self.emit(kind, ServiceEventKind::StartComplete { pid }),
            Err(ref e) => self.emit(
                kind,
                ServiceEventKind::StartFailed {
                    error: e.to_string(),
                },
            ),
        }
        result
    }

    fn start_progress(&self, kind: ServiceKind, message: impl Into<String>) {
        self.emit(
            kind,
            ServiceEventKind::StartProgress {
                message: message.into(),
            },
        );
    }

    async fn start_vector_db(&self) -> Result<u32> {
        let db = self.vector_database()?;

        self.start_progress(ServiceKind::VectorDb, "Starting qdrant...");
        let pid = db.start(&self.cancel).await?;

        self.start_progress(ServiceKind::VectorDb, "Waiting for qdrant to become healthy...");
        if let Err(e) = db.wait_for_health().await {
            warn!(pid = pid, error = %e, "qdrant started but did not become healthy");
            return Err(e);
        }
        Ok(pid)
    }

    async fn start_retrieval(&self) -> Result<u32> {
        let server = self.retrieval_server()?;

        if let Some(ref db) = self.vector_db
            && !db.is_running().await
        {
            if !db.is_installed() {
                return Err(Error::NotInstalled(db.name().to_string()));
            }
            self.start_progress(ServiceKind::Retrieval, "Starting qdrant first...");
            self.start_vector_db().await?;
        }

        self.start_progress(ServiceKind::Retrieval, "Starting go-rag...");
        let pid = server.start(&self.cancel).await?;

        self.start_progress(ServiceKind::Retrieval, "Waiting for go-rag to become healthy...");
        if let Err(e) = server.wait_for_health().await {
            warn!(pid = pid, error = %e, "go-rag started but did not become healthy");
            return Err(e);
        }
        Ok(pid)
    }

    /// Stop a service, emitting stop events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disabled`] or [`Error::NotRunning`].
    pub async fn stop(&self, kind: ServiceKind) -> Result<StopOutcome> {
        self.emit(
            kind,
            ServiceEventKind::StopProgress {
                message: format!("Stopping {kind}..."),
            },
        );

        let result = match kind {
            ServiceKind::Retrieval => match self.retrieval_server() {
                Ok(s) => s.stop().await,
                Err(e) => Err(e),
            },
            ServiceKind::VectorDb => match self.vector_database() {
                Ok(s) => s.stop().await,
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(outcome) => {
                let orphaned_pid = match outcome {
                    StopOutcome::Exited => None,
                    StopOutcome::Orphaned { pid } => Some(pid),
                };
                self.emit(kind, ServiceEventKind::StopComplete { orphaned_pid });
            }
            Err(ref e) => self.emit(
                kind,
                ServiceEventKind::StopFailed {
                    error: e.to_string(),
                },
            ),
        }
        result
    }

    /// Installed/running/healthy snapshot; all false for a disabled service.
    pub async fn status(&self, kind: ServiceKind) -> StatusSnapshot {
        match kind {
            ServiceKind::Retrieval => match self.retrieval {
                Some(ref s) => s.status().await,
                None => StatusSnapshot::default(),
            },
            ServiceKind::VectorDb => match self.vector_db {
                Some(ref s) => s.status().await,
                None => StatusSnapshot::default(),
            },
        }
    }

    /// Lifecycle state, `None` for a disabled service.
    pub async fn lifecycle_state(&self, kind: ServiceKind) -> Option<LifecycleState> {
        match kind {
            ServiceKind::Retrieval => match self.retrieval {
                Some(ref s) => Some(s.lifecycle_state().await),
                None => None,
            },
            ServiceKind::VectorDb => match self.vector_db {
                Some(ref s) => Some(s.lifecycle_state().await),
                None => None,
            },
        }
    }

    #[must_use]
    pub fn retrieval_server_info(&self) -> RetrievalServerInfo {
        RetrievalServerInfo {
            enabled: self.config.retrieval.enabled,
            url: format!("http://localhost:{}", self.config.retrieval.port),
        }
    }

    /// Read the retrieval server's config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disabled`], [`Error::NotInstalled`] or [`Error::ConfigFile`].
    pub async fn get_retrieval_config(&self) -> Result<String> {
        self.retrieval_server()?.read_config().await
    }

    /// Replace the retrieval server's config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disabled`], [`Error::NotInstalled`] or [`Error::ConfigFile`].
    pub async fn save_retrieval_config(&self, content: String) -> Result<()> {
        self.retrieval_server()?.save_config(content).await
    }

    /// Stop the retrieval server, then the vector database, then helper binaries.
    pub async fn shutdown(&self) {
        info!("Shutting down services");

        for kind in [ServiceKind::Retrieval, ServiceKind::VectorDb] {
            if self.is_running(kind).await
                && let Err(e) = self.stop(kind).await
            {
                warn!(service = %kind, error = %e, "Failed to stop during shutdown");
            }
        }

        if let Some(ref binaries) = self.binaries {
            let report = binaries.cleanup().await;
            for failure in &report.failed {
                warn!(binary = %failure.name, error = %failure.error, "Helper binary cleanup failed");
            }
        }
    }
}
