//! Lifecycle events broadcast by the service host

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::progress::ProgressEvent;

/// The downloadable services a host manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Retrieval server (go-rag)
    Retrieval,
    /// Vector database (qdrant)
    VectorDb,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::VectorDb, ServiceKind::Retrieval];
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retrieval => write!(f, "retrieval"),
            Self::VectorDb => write!(f, "vector-db"),
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEventKind {
    DownloadStarted,
    DownloadProgress { progress: ProgressEvent },
    DownloadComplete,
    DownloadFailed { error: String },
    StartProgress { message: String },
    StartComplete { pid: u32 },
    StartFailed { error: String },
    StopProgress { message: String },
    /// `orphaned_pid` is set when the process did not exit in time
    StopComplete { orphaned_pid: Option<u32> },
    StopFailed { error: String },
}

/// Event emitted by the service host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub service: ServiceKind,
    #[serde(flatten)]
    pub kind: ServiceEventKind,
}

impl ServiceEvent {
    #[must_use]
    pub fn new(service: ServiceKind, kind: ServiceEventKind) -> Self {
        Self { service, kind }
    }

    /// Whether this event ends a download, start or stop operation
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self.kind,
            ServiceEventKind::DownloadStarted
                | ServiceEventKind::DownloadProgress { .. }
                | ServiceEventKind::StartProgress { .. }
                | ServiceEventKind::StopProgress { .. }
        )
    }
}
