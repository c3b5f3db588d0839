//! Lifecycle management for auxiliary service processes.
//!
//! This crate downloads, installs, starts, health-checks and stops optional
//! service processes (a retrieval server and a vector database) and launches
//! bundled helper binaries in the background.
//!
//! # Key Types
//!
//! - [`ProcessSupervisor`] - Owns one external process: start, bounded stop, crash detection
//! - [`ArchiveInstaller`] - Streams a release archive to disk and extracts it
//! - [`ManagedService`] - A downloadable service, parameterized by a [`ServiceProfile`]
//! - [`BinaryManager`] - Best-effort launch and cleanup of helper binaries
//! - [`ServiceHost`] - Orchestrates all of the above and broadcasts [`ServiceEvent`]s

pub mod binaries;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod host;
pub mod installer;
pub mod platform;
pub mod progress;
pub mod services;
pub mod supervisor;

// Re-exports
pub use binaries::{BinaryManager, BinarySource, BundledBinaries, CleanupReport, StartReport, StaticBundle};
pub use config::{BinariesConfig, ServiceConfig, ServicesConfig, TimeoutConfig};
pub use error::{Error, Result};
pub use events::{ServiceEvent, ServiceEventKind, ServiceKind};
pub use host::{RetrievalServerInfo, ServiceHost};
pub use installer::{ArchiveInstaller, InstallRequest};
pub use platform::Platform;
pub use progress::{DownloadStage, ProgressEvent, ProgressReporter};
pub use services::{ManagedService, RetrievalServer, ServiceProfile, VectorDb};
pub use supervisor::{
    LifecycleState, OutputTarget, ProcessSpec, ProcessState, ProcessSupervisor, StatusSnapshot,
    StopOutcome,
};
