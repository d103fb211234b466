// ============================================================
// TABULAR SOURCE
// ============================================================
// A parsed upload: ordered column names and string rows

use super::error::{AppError, Result};
use std::collections::HashSet;
use std::path::Path;

/// Cell markers treated as missing values
pub const MISSING_MARKERS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
];

/// Whether a raw cell counts as missing
pub fn is_missing(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed)
}

/// Row-oriented tabular data read from an uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct TabularSource {
    /// Original file name as uploaded
    pub file_name: String,

    /// Column names in file order
    pub columns: Vec<String>,

    /// Rows; every row has exactly `columns.len()` cells
    pub rows: Vec<Vec<String>>,
}

impl TabularSource {
    /// Build a source, rejecting shapes a table cannot hold
    pub fn new(file_name: String, columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(AppError::SourceParseError(format!(
                "'{}' has no header row",
                file_name
            )));
        }

        let mut seen = HashSet::new();
        for (idx, column) in columns.iter().enumerate() {
            if column.trim().is_empty() {
                return Err(AppError::SourceParseError(format!(
                    "Column {} in '{}' has an empty name",
                    idx + 1,
                    file_name
                )));
            }
            // SQLite folds only ASCII case when comparing identifiers
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(AppError::SourceParseError(format!(
                    "Duplicate column name '{}' in '{}'",
                    column, file_name
                )));
            }
        }

        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(AppError::SourceParseError(format!(
                    "Row {} has {} fields, expected {}",
                    idx + 1,
                    row.len(),
                    columns.len()
                )));
            }
        }

        Ok(Self {
            file_name,
            columns,
            rows,
        })
    }

    /// Display name: the file name without its extension
    pub fn dataset_name(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.file_name)
            .to_string()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All raw cells of one column, in row order
    pub fn column_values(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dataset_name_strips_extension() {
        let src = TabularSource::new("sales 2024.csv".to_string(), cols(&["a"]), vec![]).unwrap();
        assert_eq!(src.dataset_name(), "sales 2024");
    }

    #[test]
    fn test_rejects_duplicate_columns_case_insensitively() {
        let err = TabularSource::new("x.csv".to_string(), cols(&["Age", "age"]), vec![])
            .unwrap_err();
        assert!(matches!(err, AppError::SourceParseError(_)));
    }

    #[test]
    fn test_only_ascii_case_is_folded() {
        let src = TabularSource::new("x.csv".to_string(), cols(&["Ä", "ä"]), vec![]).unwrap();
        assert_eq!(src.column_count(), 2);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let rows = vec![vec!["1".to_string()]];
        let err = TabularSource::new("x.csv".to_string(), cols(&["a", "b"]), rows).unwrap_err();
        assert!(err.to_string().contains("Row 1 has 1 fields"));
    }

    #[test]
    fn test_missing_markers() {
        assert!(is_missing("  "));
        assert!(is_missing("NaN"));
        assert!(is_missing(" null "));
        assert!(!is_missing("0"));
        assert!(!is_missing("none of these"));
    }
}
