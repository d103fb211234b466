// ============================================================
// XLSX READER
// ============================================================
// First worksheet of a workbook as a TabularSource

use crate::domain::error::{AppError, Result};
use crate::domain::tabular::TabularSource;
use calamine::{Data, DataType, Reader, Xlsx};
use std::io::Cursor;
use tracing::debug;

/// Read the first worksheet; its first row is the header. Trailing empty
/// rows are dropped.
pub fn parse_xlsx(file_name: &str, bytes: &[u8]) -> Result<TabularSource> {
    let mut workbook = Xlsx::new(Cursor::new(bytes)).map_err(|e| {
        AppError::SourceParseError(format!("Failed to open Excel file: {}", e))
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::SourceParseError("No worksheet found".to_string()))?
        .map_err(|e| AppError::SourceParseError(format!("Failed to read Excel range: {}", e)))?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<String>>());

    let columns = rows.next().unwrap_or_default();
    let mut body: Vec<Vec<String>> = rows.collect();
    while body
        .last()
        .is_some_and(|row| row.iter().all(|cell| cell.is_empty()))
    {
        body.pop();
    }

    debug!(file = file_name, rows = body.len(), "Worksheet parsed");
    TabularSource::new(file_name.to_string(), columns, body)
}

/// Render one cell as text the schema inferencer understands
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| format!("{}", cell)),
        _ => cell
            .as_string()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| format!("{}", cell)),
    }
}
