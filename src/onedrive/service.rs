//! High-level connector facade.
//!
//! `Connector::connect` runs the whole resolution sequence (token, user,
//! drive, folder) under the shared retry policy and returns a facade
//! whose existence means the session is fully resolved.  All remote and
//! local operations are exposed as thin delegations to the sub-modules.

use crate::onedrive::api_client::GraphApiClient;
use crate::onedrive::auth;
use crate::onedrive::directory::DriveDirectory;
use crate::onedrive::download::Downloader;
use crate::onedrive::error::{SyncError, SyncResult};
use crate::onedrive::index::LocalIndex;
use crate::onedrive::reconcile::Reconciler;
use crate::onedrive::records::RecordStore;
use crate::onedrive::types::{
    BearerToken, ColumnSpec, Config, ConflictBehavior, EnsureOutcome, RecordOp, RecordOutcome,
    SessionContext,
};
use crate::onedrive::upload::ChunkedUploader;
use log::{info, warn};

/// Connector owning the resolved session, the Graph client, and the
/// local index.  Single logical thread of execution; not meant for
/// concurrent sharing.
#[derive(Debug)]
pub struct Connector {
    config: Config,
    client: GraphApiClient,
    ctx: SessionContext,
    index: LocalIndex,
}

impl Connector {
    /// Acquire a token and resolve user, drive, and sync folder.  The
    /// folder is created when absent and resolution is retried until it
    /// is visible, all under the configured retry policy.
    pub async fn connect(config: Config) -> SyncResult<Self> {
        let token = Self::acquire_token(&config).await?;
        let client = GraphApiClient::new(&config, &token.access_token)?;

        let dir = DriveDirectory::new(&client);
        let user = dir.resolve_user(&config.user_mail).await?;
        let drive = dir.resolve_drive(&user.id).await?;
        let (folder_id, folder_name) = Self::resolve_folder(&dir, &drive.id, &config).await?;

        info!(
            "Connected: user {} drive {} folder '{}'",
            user.id, drive.id, folder_name
        );

        let ctx = SessionContext {
            token,
            user_id: user.id,
            drive_id: drive.id,
            folder_id,
            folder_name,
        };
        let index = LocalIndex::new(config.index_path.clone());

        Ok(Self {
            config,
            client,
            ctx,
            index,
        })
    }

    async fn acquire_token(config: &Config) -> SyncResult<BearerToken> {
        let mut last = SyncError::auth("No token attempts made");

        for attempt in 0..config.retry.max_attempts {
            if attempt > 0 {
                warn!(
                    "Retrying token acquisition ({}/{})",
                    attempt + 1,
                    config.retry.max_attempts
                );
                tokio::time::sleep(config.retry.backoff(attempt - 1)).await;
            }
            match auth::client_credentials_token(config).await {
                Ok(token) => return Ok(token),
                Err(e) => last = e,
            }
        }

        Err(last)
    }

    async fn resolve_folder(
        dir: &DriveDirectory<'_>,
        drive_id: &str,
        config: &Config,
    ) -> SyncResult<(String, String)> {
        for attempt in 0..config.retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(config.retry.backoff(attempt - 1)).await;
            }
            if let Some(folder) = dir
                .resolve_or_create_folder(drive_id, &config.folder_name)
                .await?
            {
                return Ok(folder);
            }
            warn!(
                "Folder '{}' not visible yet ({}/{})",
                config.folder_name,
                attempt + 1,
                config.retry.max_attempts
            );
        }

        Err(SyncError::resolution(format!(
            "Folder '{}' did not appear after {} attempts",
            config.folder_name, config.retry.max_attempts
        )))
    }

    // ─── Session ─────────────────────────────────────────────────────

    /// The resolved session.
    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Whether the bearer token is past its expiry grace.
    pub fn token_is_expired(&self) -> bool {
        self.ctx.token.is_expired()
    }

    /// Re-run the whole resolution sequence with the same configuration.
    pub async fn reconnect(self) -> SyncResult<Self> {
        Self::connect(self.config).await
    }

    // ─── Operations ──────────────────────────────────────────────────

    /// Rebuild the local index from a fresh folder listing.
    pub async fn refresh_index(&self) -> SyncResult<usize> {
        self.reconciler().refresh_index().await
    }

    /// Cached remote id for a file name; local read only.
    pub async fn lookup(&self, file_name: &str) -> SyncResult<Option<String>> {
        self.index.lookup(file_name).await
    }

    /// Reconcile one managed file (push / pull / no-op).
    pub async fn ensure_available(&self, file_name: &str) -> SyncResult<EnsureOutcome> {
        self.reconciler().ensure_available(file_name).await
    }

    /// Ensure the managed file exists with the given table.
    pub async fn ensure_table(
        &self,
        file_name: &str,
        table: &str,
        columns: &ColumnSpec,
    ) -> SyncResult<()> {
        self.reconciler().ensure_table(file_name, table, columns).await
    }

    /// Execute a record operation; mutations are re-uploaded with
    /// replace semantics.
    pub async fn execute(
        &self,
        file_name: &str,
        table: &str,
        op: RecordOp,
    ) -> SyncResult<RecordOutcome> {
        RecordStore::new(self.uploader()).execute(file_name, table, op).await
    }

    /// Push a local file into the sync folder.
    pub async fn upload_file(
        &self,
        local_path: &str,
        remote_name: &str,
        conflict: ConflictBehavior,
    ) -> SyncResult<()> {
        self.uploader().upload(local_path, remote_name, conflict).await
    }

    /// Pull a remote file by item id; returns the local name written.
    pub async fn download_file(&self, item_id: &str) -> SyncResult<String> {
        Downloader::new(&self.client, &self.ctx).download(item_id).await
    }

    // ─── Internal ────────────────────────────────────────────────────

    fn uploader(&self) -> ChunkedUploader<'_> {
        ChunkedUploader::new(&self.client, &self.ctx, &self.config)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.client, &self.ctx, &self.index, &self.config)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
