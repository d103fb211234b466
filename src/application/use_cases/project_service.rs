//! Project workflow
//!
//! A project belongs to one user and holds at most one dataset. Every
//! operation checks ownership and runs in a single transaction.

use super::dataset_reader::{get_dataframe, purge_dataset};
use super::ingestion::{ingest_in_tx, IngestionCoordinator};
use super::query_executor::{QueryExecutor, QueryResult};
use crate::domain::dataset::{ColumnProfile, Project, ProjectDetails};
use crate::domain::error::{AppError, Result};
use crate::domain::tabular::TabularSource;
use crate::infrastructure::db::{column_details, datasets, projects, Store};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectUpload {
    pub project_id: i64,
    pub dataset_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDeletion {
    pub project_id: i64,
    pub dataset_deleted: bool,
}

fn access_denied() -> AppError {
    AppError::NotFound("Project not found or access denied".to_string())
}

fn no_dataset() -> AppError {
    AppError::NotFound("Project has no dataset linked".to_string())
}

async fn owned_project(
    conn: &mut SqliteConnection,
    project_id: i64,
    owner_user_id: i64,
) -> Result<Project> {
    projects::fetch_owned_project(conn, project_id, owner_user_id)
        .await?
        .ok_or_else(access_denied)
}

pub async fn create_project(
    store: &Store,
    owner_user_id: i64,
    project_name: &str,
    description: Option<&str>,
) -> Result<Project> {
    let name = project_name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError(
            "Project name cannot be empty".to_string(),
        ));
    }

    let mut tx = store.begin().await?;
    let created_at = Utc::now().naive_utc();
    let project_id =
        projects::insert_project(&mut tx, owner_user_id, name, description, created_at).await?;
    let project = owned_project(&mut tx, project_id, owner_user_id).await?;
    tx.commit()
        .await
        .map_err(|e| AppError::from_store("Failed to commit project creation", e))?;

    info!(project_id, owner_user_id, "Project created");
    Ok(project)
}

pub async fn list_projects(store: &Store, owner_user_id: i64) -> Result<Vec<Project>> {
    let mut conn = store.acquire().await?;
    projects::list_projects(&mut conn, owner_user_id).await
}

/// Project with its dataset metadata, if one is linked
pub async fn get_project_metadata(
    store: &Store,
    project_id: i64,
    owner_user_id: i64,
) -> Result<ProjectDetails> {
    let mut conn = store.acquire().await?;
    let project = owned_project(&mut conn, project_id, owner_user_id).await?;

    let dataset = match project.dataset_id {
        Some(dataset_id) => datasets::fetch_dataset(&mut conn, dataset_id).await?,
        None => None,
    };

    Ok(ProjectDetails {
        has_dataset: dataset.is_some(),
        dataset,
        project,
    })
}

/// Column profiles of the project's dataset
pub async fn get_project_stats(
    store: &Store,
    project_id: i64,
    owner_user_id: i64,
) -> Result<Vec<ColumnProfile>> {
    let mut conn = store.acquire().await?;
    let project = owned_project(&mut conn, project_id, owner_user_id).await?;
    let dataset_id = project.dataset_id.ok_or_else(no_dataset)?;
    column_details::list_column_profiles(&mut conn, dataset_id).await
}

/// Trusted row read on the project's dataset
pub async fn get_project_data(
    store: &Store,
    executor: &QueryExecutor,
    project_id: i64,
    owner_user_id: i64,
    limit: usize,
    columns: Option<&[String]>,
    where_clause: Option<&str>,
) -> Result<QueryResult> {
    let dataset_id = {
        let mut conn = store.acquire().await?;
        let project = owned_project(&mut conn, project_id, owner_user_id).await?;
        project.dataset_id.ok_or_else(no_dataset)?
    };
    get_dataframe(store, executor, dataset_id, limit, columns, where_clause).await
}

/// Ingest `source` and link it to a project that has no dataset yet
pub async fn upload_dataset_to_project(
    store: &Store,
    coordinator: &IngestionCoordinator,
    project_id: i64,
    owner_user_id: i64,
    source: &TabularSource,
) -> Result<ProjectUpload> {
    let upload = async {
        let mut tx = store.begin().await?;

        let project = owned_project(&mut tx, project_id, owner_user_id).await?;
        if project.dataset_id.is_some() {
            return Err(AppError::ConstraintViolation(
                "Project already has a dataset".to_string(),
            ));
        }

        let dataset_id = ingest_in_tx(&mut tx, source, owner_user_id).await?;

        // The conditional update is authoritative for concurrent uploads
        if !projects::attach_dataset(&mut tx, project_id, dataset_id).await? {
            return Err(AppError::ConstraintViolation(
                "Project already has a dataset".to_string(),
            ));
        }

        tx.commit()
            .await
            .map_err(|e| AppError::from_store("Failed to commit dataset upload", e))?;
        Ok::<i64, AppError>(dataset_id)
    };

    let dataset_id = tokio::time::timeout(coordinator.timeout(), upload)
        .await
        .map_err(|_| {
            AppError::StoreUnavailable(format!(
                "Upload timed out after {} seconds",
                coordinator.timeout().as_secs()
            ))
        })??;

    info!(project_id, dataset_id, file = %source.file_name, "Dataset uploaded to project");
    Ok(ProjectUpload {
        project_id,
        dataset_id,
    })
}

/// Delete the project's dataset; the project stays, unlinked.
/// Returns the deleted dataset id.
pub async fn unlink_dataset_from_project(
    store: &Store,
    project_id: i64,
    owner_user_id: i64,
) -> Result<i64> {
    let mut tx = store.begin().await?;
    let project = owned_project(&mut tx, project_id, owner_user_id).await?;
    let dataset_id = project.dataset_id.ok_or_else(no_dataset)?;

    purge_dataset(&mut tx, dataset_id).await?;
    tx.commit()
        .await
        .map_err(|e| AppError::from_store("Failed to commit dataset unlink", e))?;

    info!(project_id, dataset_id, "Dataset unlinked from project");
    Ok(dataset_id)
}

/// Delete a project together with its dataset, if any
pub async fn delete_project(
    store: &Store,
    project_id: i64,
    owner_user_id: i64,
) -> Result<ProjectDeletion> {
    let mut tx = store.begin().await?;
    let project = owned_project(&mut tx, project_id, owner_user_id).await?;

    if let Some(dataset_id) = project.dataset_id {
        purge_dataset(&mut tx, dataset_id).await?;
    }
    projects::delete_project_row(&mut tx, project_id).await?;

    tx.commit()
        .await
        .map_err(|e| AppError::from_store("Failed to commit project deletion", e))?;

    info!(project_id, owner_user_id, "Project deleted");
    Ok(ProjectDeletion {
        project_id,
        dataset_deleted: project.dataset_id.is_some(),
    })
}
