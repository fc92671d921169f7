//! Shared types for the OneDrive database synchronisation crate.
//!
//! Models cover the connector configuration, OAuth2 tokens, drives, drive
//! items, upload sessions, conflict behaviour, the resolved session context,
//! and the typed record operations executed against managed database files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════════

/// Configuration for the OneDrive connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Azure AD / Entra ID application (client) ID.
    pub client_id: String,
    /// Client secret for the client-credentials flow.
    pub client_secret: String,
    /// Identity authority, `https://login.microsoftonline.com/{tenant}`.
    pub authority: String,
    /// OAuth2 scopes requested with the token.
    pub scopes: Vec<String>,
    /// Graph API base URL.  Default: `https://graph.microsoft.com/v1.0`.
    pub graph_base_url: String,
    /// Mail address of the drive owner to resolve.
    pub user_mail: String,
    /// Name of the remote folder under the drive root holding the
    /// managed database files.
    pub folder_name: String,
    /// Path of the local index database.
    pub index_path: String,
    /// Timeout in seconds for HTTP calls.  Default: 60.
    pub timeout_sec: u64,
    /// Chunk size in bytes for resumable uploads.  Default: 10 MiB.
    pub chunk_size: u64,
    /// Fixed delay in milliseconds before resending a chunk after a
    /// transient server error.  Default: 2000.
    pub chunk_retry_delay_ms: u64,
    /// Retry budget shared by every bounded-retry call site.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authority: "https://login.microsoftonline.com/common".into(),
            scopes: vec!["https://graph.microsoft.com/.default".into()],
            graph_base_url: "https://graph.microsoft.com/v1.0".into(),
            user_mail: String::new(),
            folder_name: "sqlite".into(),
            index_path: "local.db".into(),
            timeout_sec: 60,
            chunk_size: 10 * 1024 * 1024,
            chunk_retry_delay_ms: 2000,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Delay before resending a chunk rejected with a 5xx status.
    pub fn chunk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_retry_delay_ms)
    }
}

/// Bounded retry policy used by the transport layer, token acquisition,
/// folder resolution, and the chunk upload loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per call site.
    pub max_attempts: u32,
    /// Base delay in milliseconds; doubled per attempt where backoff
    /// is exponential.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given zero-based attempt number.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms * 2u64.pow(attempt))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  OAuth2 / Authentication
// ═══════════════════════════════════════════════════════════════════════

/// Access token obtained from the client-credentials grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Whether the access token has expired (with 60-second grace).
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at - chrono::Duration::seconds(60)
    }
}

/// A directory user, as returned by the `/users` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
//  Drives & Drive Items
// ═══════════════════════════════════════════════════════════════════════

/// A OneDrive drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub id: String,
    pub name: Option<String>,
    pub drive_type: Option<String>,
}

/// A file or folder in a drive, reduced to the fields this crate reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: Option<String>,
    pub size: Option<i64>,
    pub file: Option<FileInfo>,
    pub folder: Option<FolderInfo>,
}

/// File-specific metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub mime_type: Option<String>,
}

/// Folder-specific metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderInfo {
    pub child_count: Option<i32>,
}

/// One page of a children listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingPage {
    pub value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
//  Upload sessions
// ═══════════════════════════════════════════════════════════════════════

/// Server-created upload session for resumable uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    pub expiration_date_time: Option<String>,
    pub next_expected_ranges: Option<Vec<String>>,
}

/// Body for a createUploadSession request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSessionCreateRequest {
    pub item: UploadItemProperties,
}

/// Item properties sent when opening an upload session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadItemProperties {
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: ConflictBehavior,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Conflict behaviour when an uploaded name collides with an existing
/// remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictBehavior {
    Fail,
    Replace,
    Rename,
}

// ═══════════════════════════════════════════════════════════════════════
//  Session context
// ═══════════════════════════════════════════════════════════════════════

/// Fully resolved remote session.  Built once by `Connector::connect`;
/// a value of this type means token, user, drive, and folder resolution
/// all succeeded.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: BearerToken,
    pub user_id: String,
    pub drive_id: String,
    pub folder_id: String,
    pub folder_name: String,
}

/// One cached entry of the local index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub remote_id: String,
    pub name: String,
}

/// Outcome of a reconciliation decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The local file was pushed to the remote folder.
    Uploaded,
    /// The remote file was pulled; holds the local name it was written to.
    Downloaded { local_name: String },
    /// Both sides exist; the local copy is authoritative.
    Present,
}

// ═══════════════════════════════════════════════════════════════════════
//  Record operations
// ═══════════════════════════════════════════════════════════════════════

/// Ordered column/value pairs for a record operation.
pub type FieldPairs = Vec<(String, serde_json::Value)>;

/// Ordered column/type pairs describing a table schema.
pub type ColumnSpec = Vec<(String, String)>;

/// A typed operation against a managed database file.
#[derive(Debug, Clone)]
pub enum RecordOp {
    /// Insert one row built from the ordered field pairs.
    Insert { fields: FieldPairs },
    /// Update rows matching every filter pair.
    Update { set: FieldPairs, filter: FieldPairs },
    /// Delete rows matching the first filter pair; additional pairs are
    /// ignored (single-predicate delete).
    Delete { filter: FieldPairs },
    /// Select rows; a filter's first pair is the equality predicate,
    /// `None` selects all rows.  Read-only.
    Select { filter: Option<FieldPairs> },
}

impl RecordOp {
    /// Whether this operation writes to the database file.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, RecordOp::Select { .. })
    }
}

/// Result of a record operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Rows produced by a select: one ordered value sequence per row,
    /// surrogate `_id` included.
    Rows(Vec<Vec<serde_json::Value>>),
    /// A mutation committed locally and re-uploaded.
    Mutated { rows_affected: u64 },
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
