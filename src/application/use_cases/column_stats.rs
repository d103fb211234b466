//! Column profiling
//!
//! Classifies a typed column as Numerical, Categorical or Datetime and
//! computes its summary statistics. Boolean columns match none of the
//! three classes; they are profiled as Categorical and logged.

use crate::domain::dataset::{ColumnProfile, SemanticClass};
use crate::domain::sql_type::{CellValue, SqlType};
use std::collections::HashSet;
use tracing::warn;

/// Maximum number of category labels kept per column
pub const MAX_DISTINCT_CATEGORIES: usize = 30;

/// Class a column falls into, if any
pub fn classify(sql_type: SqlType) -> Option<SemanticClass> {
    if sql_type.is_numeric() {
        Some(SemanticClass::Numerical)
    } else if sql_type == SqlType::Text {
        Some(SemanticClass::Categorical)
    } else if sql_type == SqlType::Timestamp {
        Some(SemanticClass::Datetime)
    } else {
        None
    }
}

/// Compute the profile of one column from its typed cells
pub fn profile_column(
    column_name: &str,
    sql_type: SqlType,
    cells: &[Option<CellValue>],
) -> ColumnProfile {
    let present: Vec<&CellValue> = cells.iter().flatten().collect();
    let missing = (cells.len() - present.len()) as i64;

    let mut seen = HashSet::new();
    let mut distinct_in_order: Vec<String> = Vec::new();
    for cell in &present {
        let key = cell.display_key();
        if seen.insert(key.clone()) {
            distinct_in_order.push(key);
        }
    }
    let unique = distinct_in_order.len() as i64;

    let class = classify(sql_type).unwrap_or_else(|| {
        warn!(
            column = column_name,
            sql_type = %sql_type,
            "Column matches no semantic class, profiling as Categorical"
        );
        SemanticClass::Categorical
    });

    let mut profile = ColumnProfile::base(
        column_name,
        sql_type.value_type_label(),
        class,
        missing,
        unique,
    );

    match class {
        SemanticClass::Numerical => {
            let numbers: Vec<f64> = present.iter().filter_map(|c| c.as_f64()).collect();
            profile.mean = mean(&numbers);
            profile.median = median(&numbers);
            profile.std_dev = sample_std_dev(&numbers);
            profile.min_value = numbers.iter().copied().reduce(f64::min);
            profile.max_value = numbers.iter().copied().reduce(f64::max);
        }
        SemanticClass::Categorical => {
            distinct_in_order.truncate(MAX_DISTINCT_CATEGORIES);
            profile.distinct_categories = Some(distinct_in_order);
        }
        SemanticClass::Datetime => {
            let stamps = present.iter().filter_map(|c| match c {
                CellValue::Timestamp(ts) => Some(*ts),
                _ => None,
            });
            let (min, max) = stamps.fold((None, None), |(min, max), ts| {
                (
                    Some(min.map_or(ts, |m: chrono::NaiveDateTime| m.min(ts))),
                    Some(max.map_or(ts, |m: chrono::NaiveDateTime| m.max(ts))),
                )
            });
            profile.min_datetime = min;
            profile.max_datetime = max;
        }
    }

    profile
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Standard deviation with n - 1 degrees of freedom
fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ints(values: &[Option<i64>]) -> Vec<Option<CellValue>> {
        values.iter().map(|v| v.map(CellValue::Integer)).collect()
    }

    fn texts(values: &[Option<&str>]) -> Vec<Option<CellValue>> {
        values
            .iter()
            .map(|v| v.map(|s| CellValue::Text(s.to_string())))
            .collect()
    }

    #[test]
    fn test_numerical_statistics() {
        let cells = ints(&[Some(2), Some(4), None, Some(4), Some(10)]);
        let p = profile_column("score", SqlType::Integer, &cells);

        assert_eq!(p.column_type, SemanticClass::Numerical);
        assert_eq!(p.value_type, "integer");
        assert_eq!(p.missing_values, 1);
        assert_eq!(p.unique_value_count, 3);
        assert_eq!(p.mean, Some(5.0));
        assert_eq!(p.median, Some(4.0));
        assert_eq!(p.min_value, Some(2.0));
        assert_eq!(p.max_value, Some(10.0));
        // sum of squared deviations = 9 + 1 + 1 + 25 = 36, / 3
        let expected = (36.0f64 / 3.0).sqrt();
        assert!((p.std_dev.unwrap() - expected).abs() < 1e-12);
        assert!(p.distinct_categories.is_none());
        assert!(p.min_datetime.is_none());
    }

    #[test]
    fn test_single_value_has_no_std_dev() {
        let p = profile_column("x", SqlType::Float, &[Some(CellValue::Float(1.5))]);
        assert_eq!(p.mean, Some(1.5));
        assert_eq!(p.std_dev, None);
    }

    #[test]
    fn test_categories_keep_first_seen_order() {
        let cells = texts(&[Some("b"), Some("a"), None, Some("b"), Some("c")]);
        let p = profile_column("letter", SqlType::Text, &cells);

        assert_eq!(p.column_type, SemanticClass::Categorical);
        assert_eq!(p.missing_values, 1);
        assert_eq!(p.unique_value_count, 3);
        assert_eq!(
            p.distinct_categories,
            Some(vec!["b".to_string(), "a".to_string(), "c".to_string()])
        );
        assert!(p.mean.is_none());
    }

    #[test]
    fn test_categories_are_truncated_not_sampled() {
        let labels: Vec<String> = (0..45).map(|i| format!("v{}", i)).collect();
        let cells: Vec<Option<CellValue>> = labels
            .iter()
            .map(|s| Some(CellValue::Text(s.clone())))
            .collect();
        let p = profile_column("label", SqlType::Text, &cells);

        let kept = p.distinct_categories.unwrap();
        assert_eq!(p.unique_value_count, 45);
        assert_eq!(kept.len(), MAX_DISTINCT_CATEGORIES);
        assert_eq!(kept[0], "v0");
        assert_eq!(kept[29], "v29");
    }

    #[test]
    fn test_datetime_range() {
        let d = |day| {
            NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let cells = vec![
            Some(CellValue::Timestamp(d(9))),
            None,
            Some(CellValue::Timestamp(d(2))),
            Some(CellValue::Timestamp(d(9))),
        ];
        let p = profile_column("when", SqlType::Timestamp, &cells);

        assert_eq!(p.column_type, SemanticClass::Datetime);
        assert_eq!(p.min_datetime, Some(d(2)));
        assert_eq!(p.max_datetime, Some(d(9)));
        assert_eq!(p.unique_value_count, 2);
        assert_eq!(p.missing_values, 1);
    }

    #[test]
    fn test_boolean_column_is_profiled_as_categorical() {
        let cells = vec![
            Some(CellValue::Boolean(true)),
            Some(CellValue::Boolean(false)),
            Some(CellValue::Boolean(true)),
        ];
        let p = profile_column("active", SqlType::Boolean, &cells);

        assert_eq!(classify(SqlType::Boolean), None);
        assert_eq!(p.column_type, SemanticClass::Categorical);
        assert_eq!(p.value_type, "boolean");
        assert_eq!(
            p.distinct_categories,
            Some(vec!["true".to_string(), "false".to_string()])
        );
    }
}
