//! Dynamic table provisioning
//!
//! Creates the per-dataset table and loads typed rows into it. Every
//! identifier is double-quoted; values always travel as bind parameters.

use crate::domain::error::{AppError, Result};
use crate::domain::sql_type::{quote_identifier, CellValue, SqlType};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

/// Bind parameters allowed in one statement (SQLite ceiling is 32766)
const MAX_BIND_PARAMS: usize = 32_000;

/// Stored form of timestamp cells
const TIMESTAMP_STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Rows per INSERT statement for a table of `column_count` columns
pub fn rows_per_statement(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

pub fn create_table_sql(table: &str, columns: &[String], types: &[SqlType]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .zip(types)
        .map(|(name, ty)| format!("{} {}", quote_identifier(name), ty.as_sql()))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table),
        defs.join(", ")
    )
}

pub async fn create_table(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[String],
    types: &[SqlType],
) -> Result<()> {
    if columns.len() != types.len() {
        return Err(AppError::Internal(format!(
            "{} columns but {} types for table {}",
            columns.len(),
            types.len(),
            table
        )));
    }

    let sql = create_table_sql(table, columns, types);
    sqlx::query(&sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_store(&format!("Failed to create table {}", table), e))?;

    debug!(table, columns = columns.len(), "Created dataset table");
    Ok(())
}

/// Insert column-major typed cells as multi-row INSERT statements.
///
/// `cells[c][r]` is the value of column `c` in row `r`; all columns must have
/// the same length. Returns the number of rows written.
pub async fn bulk_load(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[String],
    cells: &[Vec<Option<CellValue>>],
) -> Result<u64> {
    let row_count = cells.first().map(|c| c.len()).unwrap_or(0);
    if cells.len() != columns.len() || cells.iter().any(|c| c.len() != row_count) {
        return Err(AppError::Internal(format!(
            "Cell matrix does not match the {} columns of {}",
            columns.len(),
            table
        )));
    }
    if row_count == 0 {
        return Ok(0);
    }

    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let head = format!("INSERT INTO {} ({}) ", quote_identifier(table), column_list);
    let chunk = rows_per_statement(columns.len());

    let mut written = 0u64;
    let mut start = 0usize;
    while start < row_count {
        let end = (start + chunk).min(row_count);

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(head.as_str());
        builder.push_values(start..end, |mut b, row| {
            for column in cells {
                match &column[row] {
                    None => b.push_bind(Option::<String>::None),
                    Some(CellValue::Integer(v)) => b.push_bind(*v),
                    Some(CellValue::Float(v)) => b.push_bind(*v),
                    Some(CellValue::Boolean(v)) => b.push_bind(*v),
                    Some(CellValue::Timestamp(v)) => {
                        b.push_bind(v.format(TIMESTAMP_STORAGE_FORMAT).to_string())
                    }
                    Some(CellValue::Text(v)) => b.push_bind(v.clone()),
                };
            }
        });

        let res = builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::from_store(&format!("Failed to load rows into {}", table), e))?;
        written += res.rows_affected();
        start = end;
    }

    debug!(table, rows = written, "Bulk load complete");
    Ok(written)
}

pub async fn drop_table(conn: &mut SqliteConnection, table: &str) -> Result<()> {
    let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(table));
    sqlx::query(&sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_store(&format!("Failed to drop table {}", table), e))?;
    Ok(())
}
