//! Reconciliation layer: given a managed file name, decide whether to
//! push the local copy, pull the remote copy, or leave things alone,
//! using the local index cache as the source of truth.
//!
//! Every decision starts with a cache refresh from a fresh folder
//! listing, at the cost of one network round trip per call.

use crate::onedrive::api_client::GraphApiClient;
use crate::onedrive::directory::DriveDirectory;
use crate::onedrive::download::Downloader;
use crate::onedrive::error::{SyncError, SyncErrorCode, SyncResult};
use crate::onedrive::index::LocalIndex;
use crate::onedrive::records;
use crate::onedrive::types::{ColumnSpec, Config, ConflictBehavior, EnsureOutcome, SessionContext};
use crate::onedrive::upload::ChunkedUploader;
use log::{debug, info, warn};
use std::path::Path;

/// Reconciliation operations against the resolved sync folder.
pub struct Reconciler<'a> {
    client: &'a GraphApiClient,
    ctx: &'a SessionContext,
    index: &'a LocalIndex,
    config: &'a Config,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        client: &'a GraphApiClient,
        ctx: &'a SessionContext,
        index: &'a LocalIndex,
        config: &'a Config,
    ) -> Self {
        Self {
            client,
            ctx,
            index,
            config,
        }
    }

    /// List the sync folder and rebuild the index cache from it.  The
    /// whole listing is validated before the cache is touched; an item
    /// without a name aborts the refresh with the cache intact.
    pub async fn refresh_index(&self) -> SyncResult<usize> {
        let dir = DriveDirectory::new(self.client);
        let items = dir
            .list_folder_children(&self.ctx.drive_id, &self.ctx.folder_id)
            .await?;

        let mut listing = Vec::with_capacity(items.len());
        for item in &items {
            let name = item.name.clone().ok_or_else(|| {
                SyncError::new(
                    SyncErrorCode::SerializationError,
                    format!("Listing item {} has no name", item.id),
                )
            })?;
            listing.push((item.id.clone(), name));
        }

        self.index.refresh(&listing).await
    }

    /// Make `file_name` available locally, per the decision table:
    /// local-only pushes, remote-only pulls, both leaves the local copy
    /// authoritative, neither is an error.
    pub async fn ensure_available(&self, file_name: &str) -> SyncResult<EnsureOutcome> {
        self.refresh_index().await?;

        let cached = self.index.lookup(file_name).await?;
        let local = Path::new(file_name).exists();

        match (local, cached) {
            (true, None) => {
                info!("{} exists locally only, uploading", file_name);
                let uploader = ChunkedUploader::new(self.client, self.ctx, self.config);
                uploader
                    .upload(file_name, file_name, ConflictBehavior::Fail)
                    .await?;
                self.refresh_index().await?;
                Ok(EnsureOutcome::Uploaded)
            }
            (false, Some(remote_id)) => {
                info!("{} exists remotely only, downloading", file_name);
                let downloader = Downloader::new(self.client, self.ctx);
                let local_name = downloader.download(&remote_id).await?;
                Ok(EnsureOutcome::Downloaded { local_name })
            }
            (true, Some(_)) => {
                debug!("{} present on both sides, local copy wins", file_name);
                Ok(EnsureOutcome::Present)
            }
            (false, None) => Err(SyncError::not_found(format!(
                "{} exists neither locally nor in the sync folder",
                file_name
            ))),
        }
    }

    /// Ensure the managed file exists with the given table.  A file known
    /// nowhere is created locally, seeded with the table, and pushed with
    /// fail-on-conflict; every branch finishes with an idempotent create.
    /// Remote failures in the bootstrap branch are logged, not surfaced;
    /// only local database errors fail the call.
    pub async fn ensure_table(
        &self,
        file_name: &str,
        table: &str,
        columns: &ColumnSpec,
    ) -> SyncResult<()> {
        let known = match self.ensure_available(file_name).await {
            Ok(outcome) => {
                debug!("{} available ({:?})", file_name, outcome);
                true
            }
            Err(e) if e.code == SyncErrorCode::NotFound => false,
            Err(e) => {
                warn!("Could not reconcile {}: {}", file_name, e);
                true
            }
        };

        if !known {
            records::ensure_local_table(file_name, table, columns).await?;
            let uploader = ChunkedUploader::new(self.client, self.ctx, self.config);
            match uploader
                .upload(file_name, file_name, ConflictBehavior::Fail)
                .await
            {
                Ok(()) => {
                    if let Err(e) = self.refresh_index().await {
                        warn!("Index refresh after bootstrap failed: {}", e);
                    }
                }
                Err(e) => warn!("Bootstrap upload of {} failed: {}", file_name, e),
            }
        }

        records::ensure_local_table(file_name, table, columns).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onedrive::test_stub::{
        resolved_ctx, serve_script, serve_script_with_headers, test_config, Recorded,
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    struct Fixture {
        config: Config,
        ctx: SessionContext,
        index: LocalIndex,
        _dir: tempfile::TempDir,
    }

    fn fixture(base: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(base);
        config.index_path = dir
            .path()
            .join("local.db")
            .to_string_lossy()
            .to_string();
        let index = LocalIndex::new(config.index_path.clone());
        Fixture {
            config,
            ctx: resolved_ctx(),
            index,
            _dir: dir,
        }
    }

    fn children(entries: &[(&str, &str)]) -> String {
        let value: Vec<serde_json::Value> = entries
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name, "size": 1 }))
            .collect();
        json!({ "value": value }).to_string()
    }

    #[tokio::test]
    async fn local_only_uploads_with_fail_then_refreshes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);
        let upload_url = format!("{}/upload/s1", base);

        let f = fixture(&base);
        let file = f._dir.path().join("20240521.db").to_string_lossy().to_string();
        std::fs::write(&file, b"sqlite-ish payload").unwrap();

        let script = vec![
            (200, children(&[])),
            (200, json!({ "uploadUrl": upload_url }).to_string()),
            (201, json!({ "id": "r1", "name": file }).to_string()),
            (200, children(&[("r1", file.as_str())])),
        ];
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = serve_script(listener, script, log.clone());

        let client = GraphApiClient::new(&f.config, "tok").unwrap();
        let rec = Reconciler::new(&client, &f.ctx, &f.index, &f.config);

        let outcome = rec.ensure_available(&file).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Uploaded);
        server.await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        // Exactly one upload session, opened with fail-on-conflict.
        let sessions: Vec<&Recorded> = log
            .iter()
            .filter(|r| r.path.contains("createUploadSession"))
            .collect();
        assert_eq!(sessions.len(), 1);
        let body = String::from_utf8_lossy(&sessions[0].body).to_string();
        assert!(body.contains("\"fail\""));
        // The refresh follows the upload.
        assert!(log[3].path.contains("/children"));
        assert_eq!(
            f.index.lookup(&file).await.unwrap().as_deref(),
            Some("r1")
        );
    }

    #[tokio::test]
    async fn remote_only_downloads_by_cached_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let f = fixture(&base);
        let file = f._dir.path().join("20240521.db").to_string_lossy().to_string();

        let script = vec![
            (
                200,
                vec!["Content-Type: application/json".to_string()],
                children(&[("r7", file.as_str())]).into_bytes(),
            ),
            (
                200,
                vec![format!("Content-Disposition: attachment; filename=\"{}\"", file)],
                b"remote payload".to_vec(),
            ),
        ];
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = serve_script_with_headers(listener, script, log.clone());

        let client = GraphApiClient::new(&f.config, "tok").unwrap();
        let rec = Reconciler::new(&client, &f.ctx, &f.index, &f.config);

        let outcome = rec.ensure_available(&file).await.unwrap();
        assert_eq!(
            outcome,
            EnsureOutcome::Downloaded {
                local_name: file.clone()
            }
        );
        server.await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[1].path.ends_with("items/r7/content"));
        assert_eq!(std::fs::read(&file).unwrap(), b"remote payload");
    }

    #[tokio::test]
    async fn both_sides_present_is_a_no_op() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let f = fixture(&base);
        let file = f._dir.path().join("20240521.db").to_string_lossy().to_string();
        std::fs::write(&file, b"local copy").unwrap();

        let script = vec![(200, children(&[("r1", file.as_str())]))];
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = serve_script(listener, script, log.clone());

        let client = GraphApiClient::new(&f.config, "tok").unwrap();
        let rec = Reconciler::new(&client, &f.ctx, &f.index, &f.config);

        let outcome = rec.ensure_available(&file).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Present);
        server.await.unwrap();

        // Only the refresh listing went out; the local copy was untouched.
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read(&file).unwrap(), b"local copy");
    }

    #[tokio::test]
    async fn known_nowhere_reports_not_found() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let f = fixture(&base);
        let file = f._dir.path().join("missing.db").to_string_lossy().to_string();

        let script = vec![(200, children(&[]))];
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = serve_script(listener, script, log.clone());

        let client = GraphApiClient::new(&f.config, "tok").unwrap();
        let rec = Reconciler::new(&client, &f.ctx, &f.index, &f.config);

        let err = rec.ensure_available(&file).await.unwrap_err();
        assert_eq!(err.code, SyncErrorCode::NotFound);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn ensure_table_bootstraps_unknown_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);
        let upload_url = format!("{}/upload/s2", base);

        let f = fixture(&base);
        let file = f._dir.path().join("fresh.db").to_string_lossy().to_string();

        let script = vec![
            (200, children(&[])),
            (200, json!({ "uploadUrl": upload_url }).to_string()),
            (201, json!({ "id": "r2", "name": file }).to_string()),
            (200, children(&[("r2", file.as_str())])),
        ];
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = serve_script(listener, script, log.clone());

        let client = GraphApiClient::new(&f.config, "tok").unwrap();
        let rec = Reconciler::new(&client, &f.ctx, &f.index, &f.config);

        let columns = vec![
            ("name".to_string(), "TEXT".to_string()),
            ("num".to_string(), "INTEGER".to_string()),
        ];
        rec.ensure_table(&file, "test", &columns).await.unwrap();
        server.await.unwrap();

        // The fresh file was seeded and pushed with fail-on-conflict.
        let log = log.lock().unwrap();
        let sessions: Vec<&Recorded> = log
            .iter()
            .filter(|r| r.path.contains("createUploadSession"))
            .collect();
        assert_eq!(sessions.len(), 1);
        let body = String::from_utf8_lossy(&sessions[0].body).to_string();
        assert!(body.contains("\"fail\""));

        // The table is usable afterwards; a select never re-uploads.
        let store = crate::onedrive::records::RecordStore::new(ChunkedUploader::new(
            &client, &f.ctx, &f.config,
        ));
        let op = crate::onedrive::types::RecordOp::Select { filter: None };
        let outcome = store.execute(&file, "test", op).await.unwrap();
        assert_eq!(
            outcome,
            crate::onedrive::types::RecordOutcome::Rows(vec![])
        );
    }

    #[tokio::test]
    async fn ensure_table_tolerates_remote_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let f = fixture(&base);
        let file = f._dir.path().join("offline.db").to_string_lossy().to_string();

        // Listing works, but the bootstrap upload session is refused.
        let script = vec![
            (200, children(&[])),
            (404, json!({ "error": { "code": "itemNotFound", "message": "gone" } }).to_string()),
        ];
        let log = Arc::new(Mutex::new(Vec::new()));
        let server = serve_script(listener, script, log.clone());

        let client = GraphApiClient::new(&f.config, "tok").unwrap();
        let rec = Reconciler::new(&client, &f.ctx, &f.index, &f.config);

        let columns = vec![("name".to_string(), "TEXT".to_string())];
        // Remote failure is logged, not surfaced; the local table still lands.
        rec.ensure_table(&file, "test", &columns).await.unwrap();
        server.await.unwrap();

        assert!(std::path::Path::new(&file).exists());
    }
}
