use crate::domain::dataset::Project;
use crate::domain::error::{AppError, Result};
use chrono::NaiveDateTime;
use sqlx::SqliteConnection;

#[derive(sqlx::FromRow)]
struct ProjectEntity {
    project_id: i64,
    project_name: String,
    description: Option<String>,
    owner_user_id: i64,
    dataset_id: Option<i64>,
    created_at: NaiveDateTime,
}

impl From<ProjectEntity> for Project {
    fn from(e: ProjectEntity) -> Self {
        Self {
            project_id: e.project_id,
            project_name: e.project_name,
            description: e.description,
            owner_user_id: e.owner_user_id,
            dataset_id: e.dataset_id,
            created_at: e.created_at,
        }
    }
}

const PROJECT_COLUMNS: &str =
    "project_id, project_name, description, owner_user_id, dataset_id, created_at";

pub async fn insert_project(
    conn: &mut SqliteConnection,
    owner_user_id: i64,
    project_name: &str,
    description: Option<&str>,
    created_at: NaiveDateTime,
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO projects (project_name, description, owner_user_id, created_at)
         VALUES (?, ?, ?, ?)
         RETURNING project_id",
    )
    .bind(project_name)
    .bind(description)
    .bind(owner_user_id)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::from_store("Failed to create project", e))
}

/// Project only if `owner_user_id` owns it
pub async fn fetch_owned_project(
    conn: &mut SqliteConnection,
    project_id: i64,
    owner_user_id: i64,
) -> Result<Option<Project>> {
    let sql = format!(
        "SELECT {} FROM projects WHERE project_id = ? AND owner_user_id = ?",
        PROJECT_COLUMNS
    );
    sqlx::query_as::<_, ProjectEntity>(&sql)
        .bind(project_id)
        .bind(owner_user_id)
        .fetch_optional(&mut *conn)
        .await
        .map(|row| row.map(Project::from))
        .map_err(|e| AppError::from_store("Failed to fetch project", e))
}

pub async fn list_projects(conn: &mut SqliteConnection, owner_user_id: i64) -> Result<Vec<Project>> {
    let sql = format!(
        "SELECT {} FROM projects WHERE owner_user_id = ? ORDER BY project_id",
        PROJECT_COLUMNS
    );
    sqlx::query_as::<_, ProjectEntity>(&sql)
        .bind(owner_user_id)
        .fetch_all(&mut *conn)
        .await
        .map(|rows| rows.into_iter().map(Project::from).collect())
        .map_err(|e| AppError::from_store("Failed to list projects", e))
}

/// Link a dataset to a project that has none.
///
/// Returns false when the project already holds a dataset; the affected-row
/// count is the authority, not any earlier read.
pub async fn attach_dataset(
    conn: &mut SqliteConnection,
    project_id: i64,
    dataset_id: i64,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE projects SET dataset_id = ? WHERE project_id = ? AND dataset_id IS NULL",
    )
    .bind(dataset_id)
    .bind(project_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::from_store("Failed to attach dataset to project", e))?;
    Ok(res.rows_affected() == 1)
}

pub async fn delete_project_row(conn: &mut SqliteConnection, project_id: i64) -> Result<u64> {
    let res = sqlx::query("DELETE FROM projects WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_store("Failed to delete project", e))?;
    Ok(res.rows_affected())
}
