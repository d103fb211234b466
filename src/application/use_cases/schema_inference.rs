//! Schema inference for uploaded columns
//!
//! Maps the raw string cells of one column to the SQL type of its table
//! column, by fixed precedence: integer, float, boolean, timestamp, text.
//! Missing cells are ignored; a column with no observed value is TEXT.

use crate::domain::error::{AppError, Result};
use crate::domain::sql_type::{CellValue, SqlType};
use crate::domain::tabular::is_missing;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Infer the SQL type of a column from its raw cells. Never fails.
pub fn sql_type_for(values: &[String]) -> SqlType {
    let observed: Vec<&str> = values
        .iter()
        .filter(|v| !is_missing(v))
        .map(|v| v.trim())
        .collect();

    if observed.is_empty() {
        return SqlType::Text;
    }

    if observed.iter().all(|v| parse_integer(v).is_some()) {
        SqlType::Integer
    } else if observed.iter().all(|v| parse_float(v).is_some()) {
        SqlType::Float
    } else if observed.iter().all(|v| parse_boolean(v).is_some()) {
        SqlType::Boolean
    } else if observed.iter().all(|v| parse_timestamp(v).is_some()) {
        SqlType::Timestamp
    } else {
        SqlType::Text
    }
}

/// Convert raw cells to typed cells; missing cells become `None`
pub fn coerce_column(
    column_name: &str,
    values: &[String],
    sql_type: SqlType,
) -> Result<Vec<Option<CellValue>>> {
    values
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            if is_missing(raw) {
                return Ok(None);
            }
            let v = raw.trim();
            let cell = match sql_type {
                SqlType::Integer => parse_integer(v).map(CellValue::Integer),
                SqlType::Float => parse_float(v).map(CellValue::Float),
                SqlType::Boolean => parse_boolean(v).map(CellValue::Boolean),
                SqlType::Timestamp => parse_timestamp(v).map(CellValue::Timestamp),
                // Text keeps the cell as uploaded
                SqlType::Text => Some(CellValue::Text(raw.to_string())),
            };
            cell.map(Some).ok_or_else(|| {
                AppError::TypeInferenceError(format!(
                    "Value '{}' in column '{}' (row {}) is not a valid {}",
                    raw,
                    column_name,
                    row + 1,
                    sql_type
                ))
            })
        })
        .collect()
}

fn parse_integer(v: &str) -> Option<i64> {
    v.parse::<i64>().ok()
}

fn parse_float(v: &str) -> Option<f64> {
    v.parse::<f64>().ok().filter(|f| !f.is_nan())
}

fn parse_boolean(v: &str) -> Option<bool> {
    if v.eq_ignore_ascii_case("true") {
        Some(true)
    } else if v.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn parse_timestamp(v: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(v, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_integer_wins_over_float() {
        assert_eq!(sql_type_for(&values(&["1", "2", "-3"])), SqlType::Integer);
    }

    #[test]
    fn test_float_when_any_value_has_fraction() {
        assert_eq!(sql_type_for(&values(&["1", "2.5", ""])), SqlType::Float);
    }

    #[test]
    fn test_boolean_is_case_insensitive() {
        assert_eq!(
            sql_type_for(&values(&["True", "false", "TRUE"])),
            SqlType::Boolean
        );
    }

    #[test]
    fn test_timestamp_detection() {
        assert_eq!(
            sql_type_for(&values(&["2024-01-05", "2024-02-10 13:45:00", "NA"])),
            SqlType::Timestamp
        );
    }

    #[test]
    fn test_mixed_values_fall_back_to_text() {
        assert_eq!(sql_type_for(&values(&["1", "two", "3"])), SqlType::Text);
        assert_eq!(sql_type_for(&values(&["true", "1"])), SqlType::Text);
    }

    #[test]
    fn test_missing_only_column_is_text() {
        assert_eq!(sql_type_for(&values(&["", "NA", "null"])), SqlType::Text);
        assert_eq!(sql_type_for(&[]), SqlType::Text);
    }

    #[test]
    fn test_coerce_keeps_missing_as_none() {
        let cells = coerce_column("age", &values(&["4", "", "7"]), SqlType::Integer).unwrap();
        assert_eq!(
            cells,
            vec![Some(CellValue::Integer(4)), None, Some(CellValue::Integer(7))]
        );
    }

    #[test]
    fn test_coerce_rejects_values_of_another_type() {
        let err = coerce_column("age", &values(&["4", "x"]), SqlType::Integer).unwrap_err();
        assert!(matches!(err, AppError::TypeInferenceError(_)));
    }
}
