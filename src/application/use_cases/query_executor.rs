//! Read-only query execution
//!
//! Runs one query on a pooled connection switched to `PRAGMA query_only`,
//! under a deadline enforced inside SQLite by a progress handler, and
//! converts the rows to JSON objects. Rows are streamed, so the row cap
//! also caps what is read.

use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::Store;
use base64::Engine;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rows returned for one candidate query
pub const MAX_RESULT_ROWS: usize = 50;

const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// VM instructions between deadline checks
const PROGRESS_CHECK_OPS: i32 = 1000;

/// Extra wait for an interrupted statement to unwind before the
/// connection is given up
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Query result as JSON-ready rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    pub row_count: usize,
}

#[derive(Debug, Clone)]
pub struct QueryExecutor {
    query_timeout: Duration,
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
    }
}

impl QueryExecutor {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Execute a sanitized query; at most [`MAX_RESULT_ROWS`] rows come back
    pub async fn execute(&self, store: &Store, sql: &str) -> Result<QueryResult> {
        self.execute_bounded(store, sql, MAX_RESULT_ROWS).await
    }

    /// Execute read-only SQL, reading at most `max_rows` rows
    pub async fn execute_bounded(
        &self,
        store: &Store,
        sql: &str,
        max_rows: usize,
    ) -> Result<QueryResult> {
        let mut guard = ReadOnlyConnection::acquire(store).await?;
        let deadline = Instant::now() + self.query_timeout;
        guard.arm_deadline(deadline).await?;

        let conn = guard.connection()?;
        let outcome = tokio::time::timeout(
            self.query_timeout + INTERRUPT_GRACE,
            fetch_rows(conn, sql, max_rows),
        )
        .await;

        let rows = match outcome {
            Ok(fetched) => {
                guard.restore().await;
                fetched.map_err(|e| {
                    if Instant::now() >= deadline {
                        self.timed_out()
                    } else {
                        AppError::QueryExecution(e.to_string())
                    }
                })?
            }
            Err(_) => {
                // The guard is not restored, so the connection is detached
                warn!("Query did not stop at its deadline, discarding connection");
                return Err(self.timed_out());
            }
        };

        let result = rows_to_result(&rows);
        debug!(rows = result.row_count, "Query executed");
        Ok(result)
    }

    fn timed_out(&self) -> AppError {
        AppError::QueryExecution(format!(
            "Query timed out after {} seconds",
            self.query_timeout.as_secs()
        ))
    }
}

async fn fetch_rows(
    conn: &mut SqliteConnection,
    sql: &str,
    max_rows: usize,
) -> std::result::Result<Vec<SqliteRow>, sqlx::Error> {
    let mut stream = sqlx::query(sql).fetch(conn);
    let mut rows = Vec::new();
    while rows.len() < max_rows {
        match stream.try_next().await? {
            Some(row) => rows.push(row),
            None => break,
        }
    }
    Ok(rows)
}

/// Pooled connection with `query_only` switched on. A connection that could
/// not be switched back is detached so it never returns to the pool.
struct ReadOnlyConnection {
    conn: Option<PoolConnection<Sqlite>>,
    restored: bool,
}

impl ReadOnlyConnection {
    async fn acquire(store: &Store) -> Result<Self> {
        let mut conn = store.acquire().await?;
        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::from_store("Failed to enable query_only", e))?;
        Ok(Self {
            conn: Some(conn),
            restored: false,
        })
    }

    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("Connection already released".to_string()))
    }

    /// Interrupt any statement on this connection still running at `deadline`
    async fn arm_deadline(&mut self, deadline: Instant) -> Result<()> {
        let conn = self.connection()?;
        let mut handle = conn
            .lock_handle()
            .await
            .map_err(|e| AppError::from_store("Failed to lock connection", e))?;
        handle.set_progress_handler(PROGRESS_CHECK_OPS, move || Instant::now() < deadline);
        Ok(())
    }

    async fn restore(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        // The handler has to go first or it would interrupt the reset itself
        match conn.lock_handle().await {
            Ok(mut handle) => handle.remove_progress_handler(),
            Err(e) => {
                warn!("Failed to remove progress handler, discarding connection: {}", e);
                return;
            }
        }

        match sqlx::query("PRAGMA query_only = OFF")
            .execute(&mut **conn)
            .await
        {
            Ok(_) => self.restored = true,
            Err(e) => warn!("Failed to reset query_only, discarding connection: {}", e),
        }
    }
}

impl Drop for ReadOnlyConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.restored {
                drop(conn.detach());
            }
        }
    }
}

fn rows_to_result(rows: &[SqliteRow]) -> QueryResult {
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows_json: Vec<HashMap<String, serde_json::Value>> = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, column)| (column.name().to_string(), extract_column_value(row, i)))
                .collect()
        })
        .collect();

    QueryResult {
        columns,
        row_count: rows_json.len(),
        rows: rows_json,
    }
}

/// Convert one cell to JSON by its storage class. Integers in a column
/// declared BOOLEAN come back as booleans.
fn extract_column_value(row: &SqliteRow, index: usize) -> serde_json::Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return serde_json::Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return serde_json::Value::Null,
    };
    let declared_boolean = row
        .columns()
        .get(index)
        .is_some_and(|c| c.type_info().name().eq_ignore_ascii_case("BOOLEAN"));

    match storage.as_str() {
        "INTEGER" => match row.try_get::<i64, _>(index) {
            Ok(v) if declared_boolean => serde_json::Value::Bool(v != 0),
            Ok(v) => serde_json::Value::Number(v.into()),
            Err(_) => serde_json::Value::Null,
        },
        "REAL" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|b| serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b)))
            .unwrap_or(serde_json::Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
    }
}
