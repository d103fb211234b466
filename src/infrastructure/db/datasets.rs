use crate::domain::dataset::DatasetMetadata;
use crate::domain::error::{AppError, Result};
use chrono::NaiveDateTime;
use sqlx::SqliteConnection;

/// Values written when a dataset is registered
#[derive(Debug, Clone)]
pub struct NewDataset<'a> {
    pub dataset_name: &'a str,
    pub file_path: &'a str,
    pub upload_date: NaiveDateTime,
    pub num_rows: i64,
    pub num_columns: i64,
    pub owner_user_id: i64,
    pub column_names: &'a [String],
}

#[derive(sqlx::FromRow)]
struct DatasetEntity {
    dataset_id: i64,
    dataset_name: String,
    file_path: Option<String>,
    table_name: Option<String>,
    num_rows: i64,
    num_columns: i64,
    upload_date: NaiveDateTime,
    owner_user_id: i64,
    column_names: String,
}

impl TryFrom<DatasetEntity> for DatasetMetadata {
    type Error = AppError;

    fn try_from(e: DatasetEntity) -> Result<Self> {
        let column_names: Vec<String> = serde_json::from_str(&e.column_names).map_err(|err| {
            AppError::DatabaseError(format!(
                "Corrupt column_names for dataset {}: {}",
                e.dataset_id, err
            ))
        })?;
        let table_name = e.table_name.ok_or_else(|| {
            AppError::DatabaseError(format!("Dataset {} has no table name", e.dataset_id))
        })?;

        Ok(Self {
            dataset_id: e.dataset_id,
            dataset_name: e.dataset_name,
            file_name: e.file_path,
            table_name,
            num_rows: e.num_rows,
            num_columns: e.num_columns,
            upload_date: e.upload_date,
            owner_user_id: e.owner_user_id,
            column_names,
        })
    }
}

/// Insert a metadata row and return its generated identity
pub async fn insert_dataset(conn: &mut SqliteConnection, input: &NewDataset<'_>) -> Result<i64> {
    let column_names = serde_json::to_string(input.column_names)
        .map_err(|e| AppError::Internal(format!("Failed to encode column names: {}", e)))?;

    sqlx::query_scalar::<_, i64>(
        "INSERT INTO datasets_metadata
            (dataset_name, file_path, upload_date, num_rows, num_columns, owner_user_id, column_names)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING dataset_id",
    )
    .bind(input.dataset_name)
    .bind(input.file_path)
    .bind(input.upload_date)
    .bind(input.num_rows)
    .bind(input.num_columns)
    .bind(input.owner_user_id)
    .bind(column_names)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::from_store("Failed to insert dataset metadata", e))
}

pub async fn set_table_name(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    table_name: &str,
) -> Result<()> {
    sqlx::query("UPDATE datasets_metadata SET table_name = ? WHERE dataset_id = ?")
        .bind(table_name)
        .bind(dataset_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_store("Failed to set dataset table name", e))?;
    Ok(())
}

pub async fn fetch_dataset(
    conn: &mut SqliteConnection,
    dataset_id: i64,
) -> Result<Option<DatasetMetadata>> {
    let entity = sqlx::query_as::<_, DatasetEntity>(
        "SELECT dataset_id, dataset_name, file_path, table_name, num_rows, num_columns,
                upload_date, owner_user_id, column_names
         FROM datasets_metadata
         WHERE dataset_id = ?",
    )
    .bind(dataset_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::from_store("Failed to fetch dataset metadata", e))?;

    entity.map(DatasetMetadata::try_from).transpose()
}

/// Owner of a dataset, if the dataset exists
pub async fn fetch_dataset_owner(conn: &mut SqliteConnection, dataset_id: i64) -> Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT owner_user_id FROM datasets_metadata WHERE dataset_id = ?")
        .bind(dataset_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::from_store("Failed to fetch dataset owner", e))
}

pub async fn delete_dataset_row(conn: &mut SqliteConnection, dataset_id: i64) -> Result<u64> {
    let res = sqlx::query("DELETE FROM datasets_metadata WHERE dataset_id = ?")
        .bind(dataset_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_store("Failed to delete dataset metadata", e))?;
    Ok(res.rows_affected())
}
