//! Download engine: fetch a remote file's content by item id and write it
//! to local disk under the server-suggested name.

use crate::onedrive::api_client::GraphApiClient;
use crate::onedrive::error::SyncResult;
use crate::onedrive::types::SessionContext;
use log::info;

/// Download operations against the resolved drive.
pub struct Downloader<'a> {
    client: &'a GraphApiClient,
    ctx: &'a SessionContext,
}

impl<'a> Downloader<'a> {
    pub fn new(client: &'a GraphApiClient, ctx: &'a SessionContext) -> Self {
        Self { client, ctx }
    }

    /// Fetch the content of `item_id` and write it to the file name the
    /// server suggests in `Content-Disposition` (fallback: the item id).
    /// Returns the local name written.
    pub async fn download(&self, item_id: &str) -> SyncResult<String> {
        let path = format!("drives/{}/items/{}/content", self.ctx.drive_id, item_id);
        let (headers, bytes) = self.client.get_content(&path).await?;

        let local_name = headers
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_name)
            .unwrap_or_else(|| item_id.to_string());

        std::fs::write(&local_name, &bytes)?;
        info!("Downloaded {} ({} bytes) to {}", item_id, bytes.len(), local_name);
        Ok(local_name)
    }
}

/// Extract the `filename` parameter from a `Content-Disposition` header.
fn attachment_name(header: &str) -> Option<String> {
    let rest = header.split("filename=").nth(1)?;
    let name = rest.split(';').next()?.trim().trim_matches('"');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
