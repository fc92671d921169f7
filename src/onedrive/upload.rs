//! Chunked, resumable upload engine.
//!
//! One upload session is opened per invocation and driven to completion
//! with fixed-size range PUTs.  Transient server errors resend the same
//! range after a fixed delay, bounded by the shared retry policy; the
//! session is never reused across runs.

use crate::onedrive::api_client::GraphApiClient;
use crate::onedrive::error::{SyncError, SyncErrorCode, SyncResult};
use crate::onedrive::types::{
    Config, ConflictBehavior, SessionContext, UploadItemProperties, UploadSession,
    UploadSessionCreateRequest,
};
use log::{debug, info, warn};
use std::cmp;

/// Upload operations against the resolved sync folder.
pub struct ChunkedUploader<'a> {
    client: &'a GraphApiClient,
    ctx: &'a SessionContext,
    config: &'a Config,
}

impl<'a> ChunkedUploader<'a> {
    pub fn new(client: &'a GraphApiClient, ctx: &'a SessionContext, config: &'a Config) -> Self {
        Self {
            client,
            ctx,
            config,
        }
    }

    /// Open a resumable upload session for `remote_name` under the sync
    /// folder.  A failure here aborts the upload before any chunk is sent.
    pub async fn create_upload_session(
        &self,
        remote_name: &str,
        conflict: ConflictBehavior,
    ) -> SyncResult<UploadSession> {
        let path = format!(
            "drives/{}/items/{}:/{}:/createUploadSession",
            self.ctx.drive_id, self.ctx.folder_id, remote_name
        );
        let body = serde_json::to_value(UploadSessionCreateRequest {
            item: UploadItemProperties {
                conflict_behavior: conflict,
                name: None,
            },
        })?;

        let resp = self.client.post(&path, &body).await?;
        let session: UploadSession = serde_json::from_value(resp)?;
        debug!("Upload session created for '{}'", remote_name);
        Ok(session)
    }

    /// Upload a local file to the sync folder as `remote_name`.
    ///
    /// The cursor advances to the lower bound of the server's next
    /// expected range after each interim accept; a terminal 200/201 wins
    /// immediately even if the local accounting has bytes left.  The index
    /// cache is not refreshed here; callers do that explicitly.
    pub async fn upload(
        &self,
        local_path: &str,
        remote_name: &str,
        conflict: ConflictBehavior,
    ) -> SyncResult<()> {
        let data = std::fs::read(local_path)?;
        let total = data.len() as u64;
        if total == 0 {
            return Err(SyncError::new(
                SyncErrorCode::InvalidRequest,
                format!("{} is empty; empty uploads are not supported", local_path),
            ));
        }

        let session = self.create_upload_session(remote_name, conflict).await?;

        let chunk_size = self.config.chunk_size;
        let budget = self.config.retry.max_attempts;
        let mut start: u64 = 0;
        let mut end = chunk_end(start, chunk_size, total);
        let mut resends: u32 = 0;

        while start < total {
            let slice = data[start as usize..=end as usize].to_vec();
            let (status, body) = self
                .client
                .put_upload_range(&session.upload_url, slice, start, end, total)
                .await?;

            match status {
                200 | 201 => {
                    info!("Upload complete: {}", remote_name);
                    return Ok(());
                }
                202 => {
                    resends = 0;
                    start = next_range_start(&body).unwrap_or(end + 1);
                    end = chunk_end(start, chunk_size, total);
                }
                500..=599 => {
                    resends += 1;
                    if resends >= budget {
                        return Err(SyncError::retries_exhausted(format!(
                            "Chunk {}-{} of {} failed {} times (last status {})",
                            start, end, remote_name, resends, status
                        )));
                    }
                    warn!(
                        "Transient {} on chunk {}-{}, resending ({}/{})",
                        status, start, end, resends, budget - 1
                    );
                    tokio::time::sleep(self.config.chunk_retry_delay()).await;
                }
                _ => {
                    return Err(SyncError::transfer(format!(
                        "Upload of {} rejected with HTTP {}",
                        remote_name, status
                    )));
                }
            }
        }

        Err(SyncError::transfer(format!(
            "Upload of {} sent every byte but never completed",
            remote_name
        )))
    }
}

/// Inclusive end of the chunk starting at `start`.
fn chunk_end(start: u64, chunk_size: u64, total: u64) -> u64 {
    cmp::min(start + chunk_size - 1, total - 1)
}

/// Lower bound of the first `nextExpectedRanges` entry, i.e. one past the
/// last byte the server accepted.
fn next_range_start(body: &serde_json::Value) -> Option<u64> {
    body["nextExpectedRanges"]
        .as_array()?
        .first()?
        .as_str()?
        .split('-')
        .next()?
        .parse()
        .ok()
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
