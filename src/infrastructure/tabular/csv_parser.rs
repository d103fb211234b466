// ============================================================
// CSV PARSER
// ============================================================
// Decode delimited text into a TabularSource

use crate::domain::error::{AppError, Result};
use crate::domain::tabular::TabularSource;
use csv::{ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV parser with delimiter detection
pub struct CsvParser {
    /// Delimiter character; detected from content when unset
    delimiter: Option<u8>,

    /// Whether to trim whitespace from headers and values
    trim: bool,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self {
            delimiter: None,
            trim: true,
        }
    }
}

impl CsvParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed delimiter instead of detecting one
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Keep surrounding whitespace in headers and values
    pub fn without_trim(mut self) -> Self {
        self.trim = false;
        self
    }

    /// Parse raw upload bytes. The first record is the header; every row
    /// must have as many fields as the header.
    pub fn parse_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<TabularSource> {
        let content = decode_text(bytes);
        self.parse_content(file_name, &content)
    }

    pub fn parse_content(&self, file_name: &str, content: &str) -> Result<TabularSource> {
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| Self::detect_delimiter(content));

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(if self.trim { Trim::All } else { Trim::None })
            .flexible(false)
            .from_reader(content.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| {
                AppError::SourceParseError(format!("Failed to read CSV headers: {}", e))
            })?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::SourceParseError(format!(
                    "Failed to parse CSV row {}: {}",
                    index + 1,
                    e
                ))
            })?;
            rows.push(record.iter().map(|v| v.to_string()).collect());
        }

        debug!(
            file = file_name,
            delimiter = %(delimiter as char).escape_default(),
            rows = rows.len(),
            "CSV parsed"
        );

        TabularSource::new(file_name.to_string(), columns, rows)
    }

    /// Detect delimiter from content (comma, semicolon, tab, pipe)
    pub fn detect_delimiter(content: &str) -> u8 {
        let candidates = [b',', b';', b'\t', b'|'];

        let mut best_delimiter = b',';
        let mut best_score = 0.0f32;

        let sample_lines: Vec<_> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(10)
            .collect();
        if sample_lines.is_empty() {
            return best_delimiter;
        }

        for &delimiter in &candidates {
            let field_counts: Vec<usize> = sample_lines
                .iter()
                .map(|line| line.bytes().filter(|&b| b == delimiter).count())
                .collect();

            // Score by consistency (low standard deviation) and frequency
            let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
            let variance = field_counts
                .iter()
                .map(|&x| (x as f32 - avg).powi(2))
                .sum::<f32>()
                / field_counts.len() as f32;

            let score = avg / (1.0 + variance.sqrt());

            if score > best_score {
                best_score = score;
                best_delimiter = delimiter;
            }
        }

        best_delimiter
    }
}

/// UTF-8 (BOM stripped) when valid, Windows-1252 otherwise
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(content) => content.to_string(),
        Err(_) => {
            let (content, _, _) = WINDOWS_1252.decode(bytes);
            debug!("Source is not UTF-8, decoded as Windows-1252");
            content.into_owned()
        }
    }
}
