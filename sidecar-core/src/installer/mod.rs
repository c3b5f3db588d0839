//! Download-and-install of release archives.
//!
//! An install is: create the install directory, stream the archive into a
//! temporary file next to it, extract it (stripping the synthetic top-level
//! directory), delete the archive and mark the service binary executable.
//! Errors abort immediately; already-extracted files are left in place and
//! overwritten by the next attempt.

mod download;
mod extract;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::progress::{DownloadStage, ProgressReporter};

pub use download::{CHUNK_SIZE, download_to_file};
pub use extract::extract_archive;
pub(crate) use extract::set_mode;

/// One install job: where to fetch from and where the result must end up.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Full artifact URL.
    pub url: String,
    /// Directory the archive is extracted into.
    pub install_dir: PathBuf,
    /// Temporary archive file inside `install_dir`.
    pub archive_path: PathBuf,
    /// Executable expected after extraction.
    pub binary_path: PathBuf,
}

/// Downloads and unpacks release archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveInstaller {
    client: reqwest::Client,
}

impl ArchiveInstaller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, timeouts).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Run the whole install and return the binary path.
    ///
    /// Progress goes `preparing`, `connecting`, `downloading` (once with 0
    /// and then once per chunk), `extracting`, `complete`.
    ///
    /// # Errors
    ///
    /// Any transport, status, I/O or decode error; also
    /// [`Error::BinaryMissing`] if the archive did not contain the binary.
    pub async fn install(
        &self,
        request: &InstallRequest,
        progress: &ProgressReporter,
    ) -> Result<PathBuf> {
        progress.report(DownloadStage::Preparing, 0, None);
        tokio::fs::create_dir_all(&request.install_dir).await?;

        let downloaded =
            download_to_file(&self.client, &request.url, &request.archive_path, progress).await?;

        progress.report(DownloadStage::Extracting, downloaded, None);
        info!(archive = %request.archive_path.display(), "Extracting");
        let archive = request.archive_path.clone();
        let dest = request.install_dir.clone();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
            .await
            .map_err(|e| Error::Extract {
                path: request.archive_path.clone(),
                reason: e.to_string(),
            })??;

        if let Err(e) = tokio::fs::remove_file(&request.archive_path).await {
            warn!(path = %request.archive_path.display(), error = %e, "Failed to remove downloaded archive");
        }

        if !tokio::fs::try_exists(&request.binary_path).await? {
            return Err(Error::BinaryMissing(request.binary_path.clone()));
        }
        set_mode(&request.binary_path, 0o755)?;

        progress.report(DownloadStage::Complete, downloaded, Some(downloaded));
        info!(binary = %request.binary_path.display(), "Installed");
        Ok(request.binary_path.clone())
    }
}
