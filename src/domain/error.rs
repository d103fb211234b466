use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ValidationError(String),
    SourceParseError(String),
    TypeInferenceError(String),
    StoreUnavailable(String),
    ConstraintViolation(String),
    DatabaseError(String),
    QueryExecution(String),
    IoError(String),
}

impl AppError {
    /// Classify a store failure, keeping `context` in the message.
    pub fn from_store(context: &str, err: sqlx::Error) -> Self {
        let message = format!("{}: {}", context, err);
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::StoreUnavailable(message)
            }
            sqlx::Error::WorkerCrashed => AppError::StoreUnavailable(message),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => AppError::ConstraintViolation(message),
                _ => AppError::DatabaseError(message),
            },
            _ => AppError::DatabaseError(message),
        }
    }

    /// Short machine-readable kind, used in logs and HTTP payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation",
            AppError::SourceParseError(_) => "source_parse",
            AppError::TypeInferenceError(_) => "type_inference",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::ConstraintViolation(_) => "constraint_violation",
            AppError::DatabaseError(_) => "database",
            AppError::QueryExecution(_) => "query_execution",
            AppError::IoError(_) => "io",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::SourceParseError(msg) => write!(f, "Source parse error: {}", msg),
            AppError::TypeInferenceError(msg) => write!(f, "Type inference error: {}", msg),
            AppError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            AppError::ConstraintViolation(msg) => write!(f, "Constraint violation: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::QueryExecution(msg) => write!(f, "Query execution failed: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
