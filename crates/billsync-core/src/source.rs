//! Reading the exported report into [`SourceRecord`]s.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::AppError;
use crate::models::SourceRecord;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parses a headered CSV report. A leading UTF-8 BOM is ignored and short
/// rows are accepted; missing trailing cells simply do not appear.
pub fn read_source_records<R: Read>(mut reader: R) -> Result<Vec<SourceRecord>, AppError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(&data);

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let columns = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        rows.push(SourceRecord::new(columns));
    }

    debug!("Parsed {} report rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

pub fn read_source_file(path: &Path) -> Result<Vec<SourceRecord>, AppError> {
    let file = File::open(path)?;
    read_source_records(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_with_bom_and_quotes() {
        let data = "\u{feff}Person,Hours,Date\n\"Lovelace, Ada\",8,5/30/2025\nBabbage,,2025-06-01\n";
        let rows = read_source_records(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Person"), Some("Lovelace, Ada"));
        assert_eq!(rows[0].get("Hours"), Some("8"));
        assert_eq!(rows[1].get("Hours"), Some(""));
        assert_eq!(rows[1].get("Date"), Some("2025-06-01"));
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let rows = read_source_records("Person,Hours\nAda\n".as_bytes()).unwrap();
        assert_eq!(rows[0].get("Person"), Some("Ada"));
        assert_eq!(rows[0].get("Hours"), None);
    }

    #[test]
    fn test_header_only() {
        let rows = read_source_records("Person,Hours\n".as_bytes()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_read_source_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Person,Date").unwrap();
        writeln!(file, "Ada,5/30/2025").unwrap();

        let rows = read_source_file(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = read_source_file(Path::new("/nonexistent/report.csv")).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
