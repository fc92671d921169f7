//! # drivedb-sync — OneDrive-backed SQLite file store
//!
//! Keeps small SQLite database files synchronised with a folder on
//! OneDrive through the Microsoft Graph v1.0 API: opportunistic upload
//! and download, a local index cache over the remote listing, and typed
//! record operations that republish the file after every mutation.
//!
//! The embedding process owns configuration loading and logger
//! installation; this crate only emits through the `log` facade.

pub mod onedrive;

pub use onedrive::{Connector, SyncError, SyncErrorCode, SyncResult};
pub use onedrive::{
    ColumnSpec, Config, ConflictBehavior, EnsureOutcome, FieldPairs, RecordOp, RecordOutcome,
    RetryPolicy,
};
