// ============================================================
// DATASET ENTITIES
// ============================================================
// Persisted dataset metadata, column profiles and projects

use super::error::AppError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Prefix and suffix of every per-dataset table name
pub const TABLE_PREFIX: &str = "dataset_";
pub const TABLE_SUFFIX: &str = "_data";

/// Physical table name for a dataset identity
pub fn dataset_table_name(dataset_id: i64) -> String {
    format!("{}{}{}", TABLE_PREFIX, dataset_id, TABLE_SUFFIX)
}

/// Semantic class assigned to a profiled column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemanticClass {
    Numerical,
    Categorical,
    Datetime,
}

impl SemanticClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticClass::Numerical => "Numerical",
            SemanticClass::Categorical => "Categorical",
            SemanticClass::Datetime => "Datetime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Numerical" => Some(SemanticClass::Numerical),
            "Categorical" => Some(SemanticClass::Categorical),
            "Datetime" => Some(SemanticClass::Datetime),
            _ => None,
        }
    }
}

impl std::fmt::Display for SemanticClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registered dataset, as returned by metadata reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub dataset_id: i64,
    pub dataset_name: String,
    pub file_name: Option<String>,
    pub table_name: String,
    pub num_rows: i64,
    pub num_columns: i64,
    pub upload_date: NaiveDateTime,
    pub owner_user_id: i64,
    /// Column names in source order; this is the query allow-list
    pub column_names: Vec<String>,
}

/// Computed statistics for one dataset column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column_name: String,
    pub value_type: String,
    pub column_type: SemanticClass,
    pub missing_values: i64,
    pub unique_value_count: i64,

    // Numerical
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,

    // Categorical
    pub distinct_categories: Option<Vec<String>>,

    // Datetime
    pub min_datetime: Option<NaiveDateTime>,
    pub max_datetime: Option<NaiveDateTime>,
}

impl ColumnProfile {
    /// Profile with only the always-computed fields set
    pub fn base(
        column_name: &str,
        value_type: &str,
        column_type: SemanticClass,
        missing_values: i64,
        unique_value_count: i64,
    ) -> Self {
        Self {
            column_name: column_name.to_string(),
            value_type: value_type.to_string(),
            column_type,
            missing_values,
            unique_value_count,
            mean: None,
            median: None,
            std_dev: None,
            min_value: None,
            max_value: None,
            distinct_categories: None,
            min_datetime: None,
            max_datetime: None,
        }
    }
}

/// Outcome of one ingestion; failures never leave partial artifacts
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub success: bool,
    pub dataset_id: Option<i64>,
    pub error: Option<AppError>,
}

impl IngestionResult {
    pub fn succeeded(dataset_id: i64) -> Self {
        Self {
            success: true,
            dataset_id: Some(dataset_id),
            error: None,
        }
    }

    pub fn failed(error: AppError) -> Self {
        Self {
            success: false,
            dataset_id: None,
            error: Some(error),
        }
    }
}

/// A user project holding at most one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: i64,
    pub project_name: String,
    pub description: Option<String>,
    pub owner_user_id: i64,
    pub dataset_id: Option<i64>,
    pub created_at: NaiveDateTime,
}

/// Project with its dataset metadata resolved
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetails {
    pub project: Project,
    pub has_dataset: bool,
    pub dataset: Option<DatasetMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_is_derived_from_identity() {
        assert_eq!(dataset_table_name(7), "dataset_7_data");
    }

    #[test]
    fn test_semantic_class_round_trips_through_label() {
        for class in [
            SemanticClass::Numerical,
            SemanticClass::Categorical,
            SemanticClass::Datetime,
        ] {
            assert_eq!(SemanticClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(SemanticClass::parse("Boolean"), None);
    }
}
