//! Dataset accessors
//!
//! Metadata and profile reads, the trusted row reader, the candidate query
//! boundary and dataset deletion.

use super::query_executor::{QueryExecutor, QueryResult};
use super::query_sanitizer::sanitize;
use super::table_provisioner::drop_table;
use crate::domain::dataset::{dataset_table_name, ColumnProfile, DatasetMetadata};
use crate::domain::error::{AppError, Result};
use crate::domain::sql_type::quote_identifier;
use crate::infrastructure::db::{column_details, datasets, Store};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

static EQ_QUOTED_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"=\s*"([^"]+)""#).unwrap());

static IN_LIST_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bIN\s*\(([^)]+)\)").unwrap());

static QUOTED_ITEM_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap());

/// Candidate query after sanitization, with its result
#[derive(Debug, Clone, Serialize)]
pub struct CandidateQueryOutcome {
    pub sanitized_sql: String,
    pub used_fallback: bool,
    pub fallback_reason: Option<String>,
    pub result: QueryResult,
}

fn dataset_not_found(dataset_id: i64) -> AppError {
    AppError::NotFound(format!("Dataset {} not found", dataset_id))
}

fn access_denied(dataset_id: i64) -> AppError {
    AppError::NotFound(format!(
        "Dataset {} not found or access denied",
        dataset_id
    ))
}

pub async fn get_dataset_metadata(store: &Store, dataset_id: i64) -> Result<DatasetMetadata> {
    let mut conn = store.acquire().await?;
    datasets::fetch_dataset(&mut conn, dataset_id)
        .await?
        .ok_or_else(|| dataset_not_found(dataset_id))
}

/// Column profiles of a dataset, ordered by column name
pub async fn get_column_details(store: &Store, dataset_id: i64) -> Result<Vec<ColumnProfile>> {
    let mut conn = store.acquire().await?;
    if datasets::fetch_dataset_owner(&mut conn, dataset_id).await?.is_none() {
        return Err(dataset_not_found(dataset_id));
    }
    column_details::list_column_profiles(&mut conn, dataset_id).await
}

/// Read rows through caller-built column and filter lists.
///
/// This path trusts its caller: column names are unwrapped and re-quoted and
/// double-quoted values in the filter become string literals, but the
/// filter is not otherwise validated. Execution is still read-only.
pub async fn get_dataframe(
    store: &Store,
    executor: &QueryExecutor,
    dataset_id: i64,
    limit: usize,
    columns: Option<&[String]>,
    where_clause: Option<&str>,
) -> Result<QueryResult> {
    let meta = get_dataset_metadata(store, dataset_id).await?;
    let sql = build_dataframe_sql(&meta.table_name, limit, columns, where_clause);
    executor.execute_bounded(store, &sql, limit).await
}

/// [`get_dataframe`] for the dataset's owner; anyone else sees NotFound
pub async fn get_owned_dataframe(
    store: &Store,
    executor: &QueryExecutor,
    dataset_id: i64,
    owner_user_id: i64,
    limit: usize,
    columns: Option<&[String]>,
    where_clause: Option<&str>,
) -> Result<QueryResult> {
    let meta = match get_dataset_metadata(store, dataset_id).await {
        Ok(meta) if meta.owner_user_id == owner_user_id => meta,
        Ok(_) | Err(AppError::NotFound(_)) => return Err(access_denied(dataset_id)),
        Err(e) => return Err(e),
    };
    let sql = build_dataframe_sql(&meta.table_name, limit, columns, where_clause);
    executor.execute_bounded(store, &sql, limit).await
}

pub fn build_dataframe_sql(
    table: &str,
    limit: usize,
    columns: Option<&[String]>,
    where_clause: Option<&str>,
) -> String {
    let projection = match columns {
        Some(cols) if !cols.is_empty() => cols
            .iter()
            .map(|c| quote_identifier(&normalize_column_name(c)))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    };

    let mut sql = format!("SELECT {} FROM {}", projection, table);
    if let Some(filter) = where_clause.map(str::trim).filter(|w| !w.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(&normalize_where_clause(filter));
    }
    sql.push_str(&format!(" LIMIT {}", limit));
    sql
}

/// Trim and strip wrapping quotes, repeatedly: `"'age'"` becomes `age`
pub fn normalize_column_name(column: &str) -> String {
    let mut name = column.trim();
    while name.len() >= 2
        && ((name.starts_with('"') && name.ends_with('"'))
            || (name.starts_with('\'') && name.ends_with('\'')))
    {
        name = name[1..name.len() - 1].trim();
    }
    name.to_string()
}

/// `= "x"` and `IN ("a", "b")` use identifier quotes for values; turn them
/// into string literals
pub fn normalize_where_clause(where_clause: &str) -> String {
    let literal = |value: &str| format!("'{}'", value.replace('\'', "''"));

    let rewritten = EQ_QUOTED_PATTERN.replace_all(where_clause, |caps: &Captures| {
        format!("= {}", literal(&caps[1]))
    });

    IN_LIST_PATTERN
        .replace_all(&rewritten, |caps: &Captures| {
            let items = QUOTED_ITEM_PATTERN.replace_all(&caps[1], |inner: &Captures| literal(&inner[1]));
            format!("IN ({})", items)
        })
        .into_owned()
}

/// Sanitize an untrusted query against the dataset's table and columns,
/// then execute it
pub async fn run_candidate_query(
    store: &Store,
    executor: &QueryExecutor,
    dataset_id: i64,
    candidate: &str,
) -> Result<CandidateQueryOutcome> {
    let meta = get_dataset_metadata(store, dataset_id).await?;
    let sanitized = sanitize(candidate, &meta.table_name, &meta.column_names);
    let result = executor.execute(store, &sanitized.sql).await?;

    Ok(CandidateQueryOutcome {
        used_fallback: sanitized.used_fallback(),
        fallback_reason: sanitized.fallback_reason,
        sanitized_sql: sanitized.sql,
        result,
    })
}

/// Delete a dataset owned by `owner_user_id`: table, profiles, then
/// metadata, in one transaction
pub async fn delete_dataset(store: &Store, dataset_id: i64, owner_user_id: i64) -> Result<()> {
    let mut tx = store.begin().await?;

    match datasets::fetch_dataset_owner(&mut tx, dataset_id).await? {
        Some(owner) if owner == owner_user_id => {}
        _ => return Err(access_denied(dataset_id)),
    }

    purge_dataset(&mut tx, dataset_id).await?;
    tx.commit()
        .await
        .map_err(|e| AppError::from_store("Failed to commit dataset deletion", e))?;

    info!(dataset_id, owner_user_id, "Dataset deleted");
    Ok(())
}

/// Remove every artifact of a dataset on a caller-owned transaction.
/// Projects linking it are unlinked by the foreign key.
pub(crate) async fn purge_dataset(conn: &mut SqliteConnection, dataset_id: i64) -> Result<()> {
    drop_table(conn, &dataset_table_name(dataset_id)).await?;
    column_details::delete_column_profiles(conn, dataset_id).await?;
    datasets::delete_dataset_row(conn, dataset_id).await?;
    Ok(())
}
