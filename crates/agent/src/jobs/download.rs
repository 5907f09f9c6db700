// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::debug;

use super::Progress;
use crate::error::JobError;

/// Absolute ceiling for one download, however slow the link.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Fetch `url` into `dst`, updating `progress` as bytes land.
///
/// Applies `mode` to the file when non-zero. Honors the cooperative
/// cancel flag: once set, the next write fails with [`JobError::Canceled`].
pub(super) async fn download_to(
    client: &reqwest::Client,
    url: reqwest::Url,
    dst: &Path,
    mode: u32,
    progress: &Progress,
) -> Result<(), JobError> {
    let url_str = url.to_string();
    let mut resp = client.get(url).send().await.map_err(|e| JobError::Http(e.to_string()))?;
    if resp.status() != reqwest::StatusCode::OK {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(JobError::HttpStatus { url: url_str, status, body });
    }

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| JobError::Io(e.to_string()))?;
        }
    }
    let mut file =
        tokio::fs::File::create(dst).await.map_err(|e| JobError::Io(e.to_string()))?;

    if let Some(len) = resp.content_length() {
        progress.total_size.store(len, Ordering::Relaxed);
    }

    let deadline = Instant::now() + DOWNLOAD_TIMEOUT;
    loop {
        let chunk = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return Err(JobError::Timeout),
            chunk = resp.chunk() => chunk.map_err(|e| JobError::Http(e.to_string()))?,
        };
        let Some(chunk) = chunk else { break };
        if progress.canceled.load(Ordering::Relaxed) {
            return Err(JobError::Canceled);
        }
        file.write_all(&chunk).await.map_err(|e| JobError::Io(e.to_string()))?;
        progress.copied_size.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }
    file.flush().await.map_err(|e| JobError::Io(e.to_string()))?;
    drop(file);

    if mode != 0 {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dst, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| JobError::Io(e.to_string()))?;
    }
    debug!(
        url = %url_str,
        copied = progress.copied_size.load(Ordering::Relaxed),
        "download complete"
    );
    Ok(())
}
