//! Typed record operations against a managed database file.
//!
//! Every mutating operation commits locally, then re-uploads the whole
//! file with replace-on-conflict; selects are read-only.  The database
//! file is opened and closed within the scope of each call.

use crate::onedrive::error::{SyncError, SyncErrorCode, SyncResult};
use crate::onedrive::types::{ColumnSpec, ConflictBehavior, RecordOp, RecordOutcome};
use crate::onedrive::upload::ChunkedUploader;
use log::{debug, info};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Connection, Row, Sqlite, SqliteConnection, TypeInfo};

/// Record operator bound to an uploader for the publish step.
pub struct RecordStore<'a> {
    uploader: ChunkedUploader<'a>,
}

impl<'a> RecordStore<'a> {
    pub fn new(uploader: ChunkedUploader<'a>) -> Self {
        Self { uploader }
    }

    /// Execute one operation against the named database file.  Mutations
    /// are pushed back to the remote folder with replace semantics after
    /// the local commit, whether or not content actually changed.
    pub async fn execute(
        &self,
        file_name: &str,
        table: &str,
        op: RecordOp,
    ) -> SyncResult<RecordOutcome> {
        let outcome = execute_local(file_name, table, &op).await?;

        if op.is_mutating() {
            self.uploader
                .upload(file_name, file_name, ConflictBehavior::Replace)
                .await?;
            info!("Re-uploaded {} after mutation", file_name);
        }

        Ok(outcome)
    }
}

/// Open the local file and create the table if it is absent: a surrogate
/// autoincrement `_id` plus the caller's ordered column/type pairs.
pub async fn ensure_local_table(
    file_name: &str,
    table: &str,
    columns: &ColumnSpec,
) -> SyncResult<()> {
    let column_sql: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("\"{}\" {}", name, ty))
        .collect();
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (_id INTEGER PRIMARY KEY AUTOINCREMENT, {})",
        table,
        column_sql.join(", ")
    );

    let mut conn = open(file_name).await?;
    sqlx::query(&sql).execute(&mut conn).await?;
    conn.close().await.ok();
    debug!("Ensured table {} in {}", table, file_name);
    Ok(())
}

async fn open(file_name: &str) -> SyncResult<SqliteConnection> {
    let url = format!("sqlite://{}?mode=rwc", file_name);
    Ok(SqliteConnection::connect(&url).await?)
}

async fn execute_local(
    file_name: &str,
    table: &str,
    op: &RecordOp,
) -> SyncResult<RecordOutcome> {
    let mut conn = open(file_name).await?;
    let result = run_op(&mut conn, table, op).await;
    conn.close().await.ok();
    result
}

async fn run_op(
    conn: &mut SqliteConnection,
    table: &str,
    op: &RecordOp,
) -> SyncResult<RecordOutcome> {
    match op {
        RecordOp::Insert { fields } => {
            if fields.is_empty() {
                return Err(invalid("insert requires at least one field"));
            }
            let cols: Vec<String> = fields.iter().map(|(c, _)| quote(c)).collect();
            let placeholders = vec!["?"; fields.len()].join(", ");
            let sql = format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                cols.join(", "),
                placeholders
            );
            let mut q = sqlx::query(&sql);
            for (_, v) in fields {
                q = bind_value(q, v);
            }
            let res = q.execute(&mut *conn).await?;
            Ok(RecordOutcome::Mutated {
                rows_affected: res.rows_affected(),
            })
        }

        RecordOp::Update { set, filter } => {
            if set.is_empty() || filter.is_empty() {
                return Err(invalid("update requires set and filter pairs"));
            }
            let sets: Vec<String> = set.iter().map(|(c, _)| format!("{} = ?", quote(c))).collect();
            let wheres: Vec<String> = filter
                .iter()
                .map(|(c, _)| format!("{} = ?", quote(c)))
                .collect();
            let sql = format!(
                "UPDATE \"{}\" SET {} WHERE {}",
                table,
                sets.join(", "),
                wheres.join(" AND ")
            );
            let mut q = sqlx::query(&sql);
            for (_, v) in set.iter().chain(filter.iter()) {
                q = bind_value(q, v);
            }
            let res = q.execute(&mut *conn).await?;
            Ok(RecordOutcome::Mutated {
                rows_affected: res.rows_affected(),
            })
        }

        RecordOp::Delete { filter } => {
            // Single-predicate delete: only the first pair applies.
            let (col, val) = filter
                .first()
                .ok_or_else(|| invalid("delete requires a filter pair"))?;
            let sql = format!("DELETE FROM \"{}\" WHERE {} = ?", table, quote(col));
            let res = bind_value(sqlx::query(&sql), val).execute(&mut *conn).await?;
            Ok(RecordOutcome::Mutated {
                rows_affected: res.rows_affected(),
            })
        }

        RecordOp::Select { filter } => {
            let rows = match filter.as_ref().and_then(|f| f.first()) {
                Some((col, val)) => {
                    let sql =
                        format!("SELECT * FROM \"{}\" WHERE {} = ?", table, quote(col));
                    bind_value(sqlx::query(&sql), val).fetch_all(&mut *conn).await?
                }
                None => {
                    let sql = format!("SELECT * FROM \"{}\"", table);
                    sqlx::query(&sql).fetch_all(&mut *conn).await?
                }
            };
            Ok(RecordOutcome::Rows(rows.iter().map(decode_row).collect()))
        }
    }
}

fn invalid(msg: &str) -> SyncError {
    SyncError::new(SyncErrorCode::InvalidRequest, msg)
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn bind_value<'q>(
    q: Query<'q, Sqlite, SqliteArguments<'q>>,
    v: &serde_json::Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match v {
        serde_json::Value::Null => q.bind(None::<String>),
        serde_json::Value::Bool(b) => q.bind(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else {
                q.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => q.bind(s.clone()),
        other => q.bind(other.to_string()),
    }
}

/// Decode one row into an ordered value sequence, surrogate id included.
fn decode_row(row: &SqliteRow) -> Vec<serde_json::Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| match col.type_info().name() {
            "INTEGER" => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::Null),
            "REAL" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(|f| serde_json::json!(f))
                .unwrap_or(serde_json::Value::Null),
            "BLOB" => row
                .try_get::<Option<Vec<u8>>, _>(i)
                .ok()
                .flatten()
                .map(|b| serde_json::Value::String(String::from_utf8_lossy(&b).into_owned()))
                .unwrap_or(serde_json::Value::Null),
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
