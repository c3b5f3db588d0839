//! Streaming HTTP download of a release archive.

use std::path::Path;

use futures_util::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::progress::{DownloadStage, ProgressReporter};

/// Size of one read from the response body (32KB).
pub const CHUNK_SIZE: usize = 32 * 1024;

/// GET `url` and stream the body into `dest`, reporting after every chunk.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`Error::Http`] on transport failures, [`Error::DownloadStatus`]
/// for any status other than 200 and [`Error::Io`] if the file cannot be
/// written.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: &ProgressReporter,
) -> Result<u64> {
    progress.report(DownloadStage::Connecting, 0, None);
    info!(url = %url, "Downloading");

    let response = client.get(url).send().await?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::DownloadStatus {
            url: url.to_string(),
            status: response.status().to_string(),
        });
    }

    let total = response.content_length();
    progress.report(DownloadStage::Downloading, 0, total);

    let body = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(body);
    let mut file = tokio::fs::File::create(dest).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut downloaded: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        downloaded += n as u64;
        progress.report(DownloadStage::Downloading, downloaded, total);
    }
    file.flush().await?;

    debug!(url = %url, bytes = downloaded, path = %dest.display(), "Download finished");
    Ok(downloaded)
}
