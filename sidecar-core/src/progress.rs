//! Download progress reporting.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Phase of a download the progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStage {
    Preparing,
    Connecting,
    Downloading,
    Extracting,
    Complete,
}

impl fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preparing => write!(f, "Preparing download..."),
            Self::Connecting => write!(f, "Connecting..."),
            Self::Downloading => write!(f, "Downloading..."),
            Self::Extracting => write!(f, "Extracting..."),
            Self::Complete => write!(f, "Download complete"),
        }
    }
}

/// One progress update for a running download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Bytes received so far.
    pub downloaded: u64,
    /// Size announced by `Content-Length`, if any.
    pub total: Option<u64>,
    /// Completion in percent; 0 while the total is unknown.
    pub percent: f64,
    pub stage: DownloadStage,
    /// Human-readable status line.
    pub status: String,
}

impl ProgressEvent {
    /// Build an event, computing the percentage from the byte counts.
    #[must_use]
    pub fn new(stage: DownloadStage, downloaded: u64, total: Option<u64>) -> Self {
        let percent = match stage {
            DownloadStage::Extracting | DownloadStage::Complete => 100.0,
            _ => percent_of(downloaded, total),
        };
        Self {
            downloaded,
            total,
            percent,
            stage,
            status: stage.to_string(),
        }
    }

    /// Whether this is the final event of a successful download.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage == DownloadStage::Complete
    }
}

/// Percentage of `downloaded` in `total`, 0 when the total is unknown or zero.
#[must_use]
pub fn percent_of(downloaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (downloaded as f64 / total as f64 * 100.0).min(100.0),
        _ => 0.0,
    }
}

/// Callback invoked for every progress event.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Optional progress sink; reporting without a callback is a no-op.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    /// Reporter forwarding to `callback`.
    pub fn new(callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Reporter that drops every event.
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    /// Reporter forwarding to an already shared callback.
    #[must_use]
    pub fn from_callback(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }

    /// Emit an event.
    pub fn report(&self, stage: DownloadStage, downloaded: u64, total: Option<u64>) {
        if let Some(ref callback) = self.callback {
            callback(&ProgressEvent::new(stage, downloaded, total));
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
