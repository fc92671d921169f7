//! Microsoft OneDrive database synchronisation via the Graph v1.0 API.
//!
//! ## Capabilities
//!
//! - **Authentication** – OAuth2 client-credentials flow against the
//!   Microsoft identity platform v2.0, with expiry tracking.
//! - **Directory resolution** – user by mail, first drive, and the sync
//!   folder under the drive root (created when absent).
//! - **Local index cache** – a local SQLite table mirroring the sync
//!   folder's listing, rebuilt transactionally on every refresh.
//! - **Uploads** – resumable upload sessions driven chunk by chunk, with
//!   bounded resends of a range on transient server errors.
//! - **Downloads** – content fetch by item id, written under the
//!   server-suggested file name.
//! - **Reconciliation** – push, pull, or no-op per managed file, with
//!   the local copy authoritative when both sides exist.
//! - **Record operations** – typed insert / update / delete / select
//!   against a managed database file, republished with replace
//!   semantics after every mutation.

pub mod types;
pub mod error;
pub mod auth;
pub mod api_client;
pub mod directory;
pub mod index;
pub mod upload;
pub mod download;
pub mod reconcile;
pub mod records;
pub mod service;

#[cfg(test)]
pub(crate) mod test_stub;

// Re-exports
pub use error::{SyncError, SyncErrorCode, SyncResult};
pub use service::Connector;
pub use types::*;
