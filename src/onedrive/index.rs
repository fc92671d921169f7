//! Local index cache: a small SQLite file mirroring the remote folder's
//! current listing, so lookups cost no network round trip.
//!
//! Refresh is all-or-nothing: the caller hands over a fully extracted
//! listing and upsert + eviction run inside one transaction, so a failed
//! refresh leaves the previous cache intact.

use crate::onedrive::error::SyncResult;
use crate::onedrive::types::IndexEntry;
use log::{debug, info};
use sqlx::{Connection, Row, SqliteConnection};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS drive_index (
    _id  INTEGER PRIMARY KEY AUTOINCREMENT,
    id   TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE
)";

/// Handle on the local index database.  Connections are opened and closed
/// within the scope of each call; no pool is held.
#[derive(Debug, Clone)]
pub struct LocalIndex {
    path: String,
}

impl LocalIndex {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn open(&self) -> SyncResult<SqliteConnection> {
        let url = format!("sqlite://{}?mode=rwc", self.path);
        let mut conn = SqliteConnection::connect(&url).await?;
        sqlx::query(SCHEMA).execute(&mut conn).await?;
        Ok(conn)
    }

    /// Replace the cache with the given `(remote_id, name)` listing:
    /// upsert every entry keyed by name, then evict names absent from the
    /// listing.  Runs in a single transaction.
    pub async fn refresh(&self, listing: &[(String, String)]) -> SyncResult<usize> {
        let mut conn = self.open().await?;
        let mut tx = conn.begin().await?;

        for (id, name) in listing {
            sqlx::query(
                "INSERT INTO drive_index (id, name) VALUES (?, ?)
                 ON CONFLICT(name) DO UPDATE SET id = excluded.id",
            )
            .bind(id.as_str())
            .bind(name.as_str())
            .execute(&mut *tx)
            .await?;
        }

        if listing.is_empty() {
            sqlx::query("DELETE FROM drive_index").execute(&mut *tx).await?;
        } else {
            let placeholders = vec!["?"; listing.len()].join(", ");
            let sql = format!("DELETE FROM drive_index WHERE name NOT IN ({})", placeholders);
            let mut q = sqlx::query(&sql);
            for (_, name) in listing {
                q = q.bind(name.as_str());
            }
            q.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        conn.close().await.ok();

        info!("Index refreshed: {} remote entries", listing.len());
        Ok(listing.len())
    }

    /// Look up the remote id cached for a file name.  Local read only.
    pub async fn lookup(&self, name: &str) -> SyncResult<Option<String>> {
        let mut conn = self.open().await?;
        let row = sqlx::query("SELECT id FROM drive_index WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut conn)
            .await?;
        conn.close().await.ok();

        let id = row.map(|r| r.get::<String, _>(0));
        debug!("Index lookup '{}' -> {:?}", name, id);
        Ok(id)
    }

    /// All cached entries, ordered by name.
    pub async fn entries(&self) -> SyncResult<Vec<IndexEntry>> {
        let mut conn = self.open().await?;
        let rows = sqlx::query("SELECT id, name FROM drive_index ORDER BY name")
            .fetch_all(&mut conn)
            .await?;
        conn.close().await.ok();

        Ok(rows
            .iter()
            .map(|r| IndexEntry {
                remote_id: r.get::<String, _>(0),
                name: r.get::<String, _>(1),
            })
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
