pub mod csv_parser;
pub mod xlsx_reader;

pub use csv_parser::CsvParser;
pub use xlsx_reader::parse_xlsx;

use crate::domain::error::{AppError, Result};
use crate::domain::tabular::TabularSource;
use std::path::Path;

/// Parse an uploaded file by its extension
pub fn parse_source(file_name: &str, bytes: &[u8]) -> Result<TabularSource> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "txt" => CsvParser::new().parse_bytes(file_name, bytes),
        "tsv" => CsvParser::new()
            .with_delimiter(b'\t')
            .parse_bytes(file_name, bytes),
        "xlsx" => parse_xlsx(file_name, bytes),
        other => Err(AppError::SourceParseError(format!(
            "Unsupported file type '{}' for '{}'",
            other, file_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_extension() {
        let source = parse_source("Scores.CSV", b"a,b\n1,2\n").unwrap();
        assert_eq!(source.columns, vec!["a", "b"]);

        let source = parse_source("scores.tsv", b"a\tb,c\n1\t2,3\n").unwrap();
        assert_eq!(source.columns, vec!["a", "b,c"]);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        for name in ["report.pdf", "noextension"] {
            let err = parse_source(name, b"a,b\n").unwrap_err();
            assert!(matches!(err, AppError::SourceParseError(_)));
        }
    }
}
