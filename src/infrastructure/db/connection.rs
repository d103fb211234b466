use crate::domain::error::{AppError, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const METADATA_SCHEMA: &str = include_str!("../../../resources/schema.sql");

const METADATA_SCHEMA_VERSION: i32 = 1;

/// Store handle passed into every operation.
///
/// Cloning is cheap; all clones share one pool. Connections and transactions
/// taken from it are released when dropped, on every exit path.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::DatabaseError(format!("Failed to parse database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| AppError::from_store("Failed to connect to database", e))?;

        info!(database_url, "Connected to metadata store");
        Ok(Self { pool })
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::DatabaseError(format!("Failed to parse database URL: {}", e)))?
            .foreign_keys(true);

        // The database lives as long as its last connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::from_store("Failed to open in-memory database", e))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::from_store("Failed to begin transaction", e))
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| AppError::from_store("Failed to acquire connection", e))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Apply the metadata schema and record its version.
pub async fn init_schema(store: &Store) -> Result<()> {
    let pool = store.pool();

    let current: i32 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::from_store("Failed to read PRAGMA user_version", e))?;

    if current > METADATA_SCHEMA_VERSION {
        return Err(AppError::DatabaseError(format!(
            "Database schema too new: user_version={} > supported_version={}",
            current, METADATA_SCHEMA_VERSION
        )));
    }

    for stmt in split_sql_statements(METADATA_SCHEMA) {
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .map_err(|e| AppError::from_store("Failed to apply schema statement", e))?;
    }

    let set_version = format!("PRAGMA user_version = {}", METADATA_SCHEMA_VERSION);
    sqlx::query(&set_version)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_store("Failed to set PRAGMA user_version", e))?;

    debug!(version = METADATA_SCHEMA_VERSION, "Metadata schema applied");
    Ok(())
}

/// Split a script on `;`, dropping `--` comments and ignoring semicolons
/// inside quotes.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_single = false;
    let mut in_double = false;

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '-' if !in_single && !in_double && chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        buf.push('\n');
                        break;
                    }
                }
            }
            '\'' if !in_double => {
                in_single = !in_single;
                buf.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                buf.push(c);
            }
            ';' if !in_single && !in_double => {
                let stmt = buf.trim();
                if !stmt.is_empty() {
                    out.push(stmt.to_string());
                }
                buf.clear();
            }
            _ => buf.push(c),
        }
    }

    let tail = buf.trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_drops_comments_and_keeps_quoted_semicolons() {
        let script = "-- header\nCREATE TABLE a (x TEXT DEFAULT ';');\n\nCREATE INDEX i ON a(x);\n";
        let stmts = split_sql_statements(script);
        assert_eq!(
            stmts,
            vec![
                "CREATE TABLE a (x TEXT DEFAULT ';')".to_string(),
                "CREATE INDEX i ON a(x)".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        init_schema(&store).await.unwrap();
        init_schema(&store).await.unwrap();

        let version: i32 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(version, METADATA_SCHEMA_VERSION);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec!["dataset_column_details", "datasets_metadata", "projects"]
        );
    }
}
