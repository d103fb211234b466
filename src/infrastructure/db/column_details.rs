use crate::domain::dataset::{ColumnProfile, SemanticClass};
use crate::domain::error::{AppError, Result};
use chrono::NaiveDateTime;
use sqlx::SqliteConnection;

#[derive(sqlx::FromRow)]
struct ColumnDetailEntity {
    column_name: String,
    value_type: String,
    column_type: String,
    mean: Option<f64>,
    median: Option<f64>,
    std_dev: Option<f64>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    missing_values: i64,
    unique_value_count: i64,
    distinct_categories: Option<String>,
    min_datetime: Option<NaiveDateTime>,
    max_datetime: Option<NaiveDateTime>,
}

impl TryFrom<ColumnDetailEntity> for ColumnProfile {
    type Error = AppError;

    fn try_from(e: ColumnDetailEntity) -> Result<Self> {
        let column_type = SemanticClass::parse(&e.column_type).ok_or_else(|| {
            AppError::DatabaseError(format!(
                "Unknown column type '{}' for column '{}'",
                e.column_type, e.column_name
            ))
        })?;

        let distinct_categories = e
            .distinct_categories
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()
            .map_err(|err| {
                AppError::DatabaseError(format!(
                    "Corrupt distinct_categories for column '{}': {}",
                    e.column_name, err
                ))
            })?;

        Ok(Self {
            column_name: e.column_name,
            value_type: e.value_type,
            column_type,
            missing_values: e.missing_values,
            unique_value_count: e.unique_value_count,
            mean: e.mean,
            median: e.median,
            std_dev: e.std_dev,
            min_value: e.min_value,
            max_value: e.max_value,
            distinct_categories,
            min_datetime: e.min_datetime,
            max_datetime: e.max_datetime,
        })
    }
}

pub async fn insert_column_profile(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    profile: &ColumnProfile,
) -> Result<()> {
    let categories = profile
        .distinct_categories
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::Internal(format!("Failed to encode categories: {}", e)))?;

    sqlx::query(
        "INSERT INTO dataset_column_details (
            dataset_id, column_name, value_type, column_type,
            mean, median, std_dev, min_value, max_value,
            missing_values, unique_value_count, distinct_categories,
            min_datetime, max_datetime
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(dataset_id)
    .bind(&profile.column_name)
    .bind(&profile.value_type)
    .bind(profile.column_type.as_str())
    .bind(profile.mean)
    .bind(profile.median)
    .bind(profile.std_dev)
    .bind(profile.min_value)
    .bind(profile.max_value)
    .bind(profile.missing_values)
    .bind(profile.unique_value_count)
    .bind(categories)
    .bind(profile.min_datetime)
    .bind(profile.max_datetime)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::from_store("Failed to insert column profile", e))?;

    Ok(())
}

/// Profiles of one dataset, ordered by column name
pub async fn list_column_profiles(
    conn: &mut SqliteConnection,
    dataset_id: i64,
) -> Result<Vec<ColumnProfile>> {
    let rows = sqlx::query_as::<_, ColumnDetailEntity>(
        "SELECT column_name, value_type, column_type,
                mean, median, std_dev, min_value, max_value,
                missing_values, unique_value_count, distinct_categories,
                min_datetime, max_datetime
         FROM dataset_column_details
         WHERE dataset_id = ?
         ORDER BY column_name",
    )
    .bind(dataset_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::from_store("Failed to fetch column details", e))?;

    rows.into_iter().map(ColumnProfile::try_from).collect()
}

pub async fn delete_column_profiles(conn: &mut SqliteConnection, dataset_id: i64) -> Result<u64> {
    let res = sqlx::query("DELETE FROM dataset_column_details WHERE dataset_id = ?")
        .bind(dataset_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_store("Failed to delete column details", e))?;
    Ok(res.rows_affected())
}
