// ============================================================
// SQL COLUMN TYPES
// ============================================================
// Column types of a dataset table and the typed cells loaded into them

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// SQL type declared for one column of a dataset table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Text,
}

impl SqlType {
    /// Type name used in CREATE TABLE
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Float => "FLOAT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Text => "TEXT",
        }
    }

    /// Lower-case label stored on column profiles
    pub fn value_type_label(&self) -> &'static str {
        match self {
            SqlType::Integer => "integer",
            SqlType::Float => "float",
            SqlType::Boolean => "boolean",
            SqlType::Timestamp => "timestamp",
            SqlType::Text => "text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Integer | SqlType::Float)
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// A single non-missing cell converted to its column's type
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Stable textual key used for distinct counting and category labels
    pub fn display_key(&self) -> String {
        match self {
            CellValue::Integer(v) => v.to_string(),
            // -0.0 and 0.0 count as one value
            CellValue::Float(v) => {
                if *v == 0.0 {
                    "0".to_string()
                } else {
                    v.to_string()
                }
            }
            CellValue::Boolean(v) => v.to_string(),
            CellValue::Timestamp(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            CellValue::Text(v) => v.clone(),
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_embedded_quotes() {
        assert_eq!(quote_identifier("First Name"), "\"First Name\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_negative_zero_shares_key_with_zero() {
        assert_eq!(
            CellValue::Float(-0.0).display_key(),
            CellValue::Float(0.0).display_key()
        );
    }
}
