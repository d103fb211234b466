//! Dataset ingestion
//!
//! Turns a parsed upload into a registered dataset: metadata row, dynamic
//! table with every row loaded, and one profile per column. All of it happens
//! in a single transaction; on any failure nothing persists.

use super::column_stats::profile_column;
use super::schema_inference::{coerce_column, sql_type_for};
use super::table_provisioner::{bulk_load, create_table};
use crate::domain::dataset::{dataset_table_name, IngestionResult};
use crate::domain::error::{AppError, Result};
use crate::domain::sql_type::{CellValue, SqlType};
use crate::domain::tabular::TabularSource;
use crate::infrastructure::db::{column_details, datasets, Store};
use chrono::Utc;
use sqlx::SqliteConnection;
use std::time::Duration;
use tracing::{error, info};

/// Runs ingestions under a wall-clock limit
#[derive(Debug, Clone)]
pub struct IngestionCoordinator {
    timeout: Duration,
}

impl IngestionCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ingest `source` for `owner_user_id`; never leaves partial artifacts
    pub async fn ingest(
        &self,
        store: &Store,
        source: &TabularSource,
        owner_user_id: i64,
    ) -> IngestionResult {
        let outcome = tokio::time::timeout(self.timeout, async {
            let mut tx = store.begin().await?;
            let dataset_id = ingest_in_tx(&mut tx, source, owner_user_id).await?;
            tx.commit()
                .await
                .map_err(|e| AppError::from_store("Failed to commit ingestion", e))?;
            Ok::<i64, AppError>(dataset_id)
        })
        .await
        .unwrap_or_else(|_| {
            Err(AppError::StoreUnavailable(format!(
                "Ingestion timed out after {} seconds",
                self.timeout.as_secs()
            )))
        });

        match outcome {
            Ok(dataset_id) => {
                info!(
                    dataset_id,
                    file = %source.file_name,
                    rows = source.row_count(),
                    columns = source.column_count(),
                    "Dataset ingested"
                );
                IngestionResult::succeeded(dataset_id)
            }
            Err(e) => {
                error!(file = %source.file_name, kind = e.kind(), "Ingestion failed: {}", e);
                IngestionResult::failed(e)
            }
        }
    }
}

/// Type every column of a source before anything is written
pub fn type_columns(source: &TabularSource) -> Result<(Vec<SqlType>, Vec<Vec<Option<CellValue>>>)> {
    let mut types = Vec::with_capacity(source.column_count());
    let mut cells = Vec::with_capacity(source.column_count());
    for (idx, name) in source.columns.iter().enumerate() {
        let raw = source.column_values(idx);
        let sql_type = sql_type_for(&raw);
        cells.push(coerce_column(name, &raw, sql_type)?);
        types.push(sql_type);
    }
    Ok((types, cells))
}

/// Every ingestion step on a caller-owned transaction; the caller commits.
pub async fn ingest_in_tx(
    conn: &mut SqliteConnection,
    source: &TabularSource,
    owner_user_id: i64,
) -> Result<i64> {
    let (types, cells) = type_columns(source)?;

    let dataset_name = source.dataset_name();
    let new_dataset = datasets::NewDataset {
        dataset_name: &dataset_name,
        file_path: &source.file_name,
        upload_date: Utc::now().naive_utc(),
        num_rows: source.row_count() as i64,
        num_columns: source.column_count() as i64,
        owner_user_id,
        column_names: &source.columns,
    };
    let dataset_id = datasets::insert_dataset(conn, &new_dataset).await?;

    let table = dataset_table_name(dataset_id);
    datasets::set_table_name(conn, dataset_id, &table).await?;

    create_table(conn, &table, &source.columns, &types).await?;
    bulk_load(conn, &table, &source.columns, &cells).await?;

    for ((name, sql_type), column_cells) in source.columns.iter().zip(&types).zip(&cells) {
        let profile = profile_column(name, *sql_type, column_cells);
        column_details::insert_column_profile(conn, dataset_id, &profile).await?;
    }

    Ok(dataset_id)
}
