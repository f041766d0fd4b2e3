use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use super::uri::SourceUrl;
use crate::config::CHUNK_SIZE;
use crate::error::IngestError;

/// Stream the body of an HTTP GET to `output_path`, replacing any existing file
///
/// Returns the number of bytes written. Any non-success status, a transfer
/// that ends early, or a local write failure is reported as
/// [`IngestError::Download`]. There is no retry.
pub async fn download_file(url: &SourceUrl, output_path: &Path) -> Result<u64, IngestError> {
    info!("Downloading data from {}...", url);

    let response = reqwest::get(url.as_str())
        .await
        .map_err(|e| IngestError::download(format!("request to {} failed", url), e))?
        .error_for_status()
        .map_err(|e| IngestError::download(format!("server rejected request for {}", url), e))?;

    let expected_len = response.content_length();
    let progress = download_progress(expected_len);

    let file = File::create(output_path).await.map_err(|e| {
        IngestError::download(format!("cannot create {}", output_path.display()), e)
    })?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|e| IngestError::download(format!("transfer from {} interrupted", url), e))?;
        writer.write_all(&chunk).await.map_err(|e| {
            IngestError::download(format!("cannot write {}", output_path.display()), e)
        })?;
        written += chunk.len() as u64;
        progress.set_position(written);
    }

    writer.flush().await.map_err(|e| {
        IngestError::download(format!("cannot flush {}", output_path.display()), e)
    })?;
    progress.finish_and_clear();

    if let Some(expected) = expected_len
        && expected != written
    {
        return Err(IngestError::Download {
            context: format!(
                "transfer from {} ended after {} of {} bytes",
                url, written, expected
            ),
            source: None,
        });
    }

    info!(
        bytes = written,
        path = %output_path.display(),
        "Download completed successfully."
    );
    Ok(written)
}

fn download_progress(expected_len: Option<u64>) -> ProgressBar {
    match expected_len {
        Some(len) => {
            let bar = ProgressBar::new(len);
            let style = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} | {bytes_per_sec}")
                .map(|style| style.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        }
        None => ProgressBar::new_spinner(),
    }
}
