//! Remote directory resolution: the drive owner, their drive, and the
//! sync folder under the drive root.
//!
//! Resolution is read-only except for `resolve_or_create_folder`, which
//! issues a create request when the folder is missing and reports
//! not-yet-bound so the caller can re-list under its retry policy.

use crate::onedrive::api_client::GraphApiClient;
use crate::onedrive::error::{SyncError, SyncResult};
use crate::onedrive::types::{DirectoryUser, Drive, DriveItem, ListingPage};
use log::{debug, info, warn};
use serde_json::json;

/// Directory operations.
pub struct DriveDirectory<'a> {
    client: &'a GraphApiClient,
}

impl<'a> DriveDirectory<'a> {
    pub fn new(client: &'a GraphApiClient) -> Self {
        Self { client }
    }

    /// Resolve the user whose `mail` matches exactly.
    pub async fn resolve_user(&self, mail: &str) -> SyncResult<DirectoryUser> {
        let resp = self.client.get("users").await?;
        let users: Vec<DirectoryUser> = resp["value"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        users
            .into_iter()
            .find(|u| u.mail.as_deref() == Some(mail))
            .ok_or_else(|| {
                SyncError::resolution(format!("User with mail {} not found", mail))
            })
    }

    /// Resolve the user's drive.  The first listed drive wins.
    pub async fn resolve_drive(&self, user_id: &str) -> SyncResult<Drive> {
        let path = format!("users/{}/drives", user_id);
        let resp = self.client.get(&path).await?;
        let drives: Vec<Drive> = resp["value"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        debug!("Found {} drives for user {}", drives.len(), user_id);
        drives
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::resolution(format!("User {} has no drives", user_id)))
    }

    /// Find the named folder under the drive root.  When absent, issue a
    /// create request and return `Ok(None)`; the caller re-lists until the
    /// folder is visible.
    pub async fn resolve_or_create_folder(
        &self,
        drive_id: &str,
        name: &str,
    ) -> SyncResult<Option<(String, String)>> {
        let path = format!("drives/{}/root/children", drive_id);
        let resp = self.client.get(&path).await?;
        let page: ListingPage = serde_json::from_value(resp)?;

        if let Some(item) = page
            .value
            .into_iter()
            .find(|i| i.name.as_deref() == Some(name))
        {
            info!("Resolved folder '{}' ({})", name, item.id);
            return Ok(Some((item.id, name.to_string())));
        }

        let body = json!({ "name": name, "folder": {} });
        match self.client.post(&path, &body).await {
            Ok(_) => warn!("Folder '{}' missing in drive {}, created it", name, drive_id),
            Err(e) => warn!("Folder '{}' create request failed: {}", name, e),
        }
        Ok(None)
    }

    /// List every child of a folder, following `@odata.nextLink` pages.
    pub async fn list_folder_children(
        &self,
        drive_id: &str,
        folder_id: &str,
    ) -> SyncResult<Vec<DriveItem>> {
        let mut all = Vec::new();
        let mut url = format!("drives/{}/items/{}/children", drive_id, folder_id);

        loop {
            let resp = self.client.get(&url).await?;
            let page: ListingPage = serde_json::from_value(resp)?;
            all.extend(page.value);

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!("Listed {} children of {}", all.len(), folder_id);
        Ok(all)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
