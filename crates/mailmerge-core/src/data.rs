//! Recipient data loading.

use crate::error::{Error, Result};
use crate::row::{Row, Value};
use calamine::{Reader, Xlsx, open_workbook};
use std::path::Path;
use tracing::debug;

/// Rows loaded from a data file.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    rows: Vec<Row>,
}

impl DataSet {
    /// Loads a `.csv` file, or the first worksheet of an `.xlsx` workbook.
    ///
    /// The header is the first record with a non-empty cell, starting at that
    /// cell; columns to its left are ignored in every record. Cells are
    /// trimmed, and empty cells load as [`Value::Empty`].
    ///
    /// # Errors
    ///
    /// Returns an error for unknown extensions, unreadable files, malformed
    /// CSV or workbooks, or a file without any non-empty cell.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data_error = |message: String| Error::Data {
            path: path.to_path_buf(),
            message,
        };

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let records = match extension.as_deref() {
            Some("csv") => read_csv(path),
            Some("xlsx") => read_xlsx(path),
            _ => Err("unknown file type".to_string()),
        }
        .map_err(data_error)?;

        let data = Self::from_records(&records).map_err(data_error)?;
        debug!(rows = data.len(), path = %path.display(), "data loaded");
        Ok(data)
    }

    /// Builds rows from raw records, detecting the header as [`DataSet::load`]
    /// describes.
    ///
    /// # Errors
    ///
    /// Returns a message if no record has a non-empty cell.
    pub fn from_records<S: AsRef<str>>(
        records: &[Vec<S>],
    ) -> std::result::Result<Self, String> {
        let header = records.iter().enumerate().find_map(|(index, record)| {
            record
                .iter()
                .position(|cell| !cell.as_ref().trim().is_empty())
                .map(|column| (index, column))
        });
        let Some((header_row, first_column)) = header else {
            return Err("non-empty row/column not found".to_string());
        };

        let names: Vec<String> = records[header_row][first_column..]
            .iter()
            .map(|cell| cell.as_ref().trim().to_string())
            .collect();

        let rows = records[header_row + 1..]
            .iter()
            .map(|record| {
                let cells = record.iter().skip(first_column);
                names
                    .iter()
                    .zip(cells)
                    .filter(|(name, _)| !name.is_empty())
                    .map(|(name, cell)| {
                        let cell = cell.as_ref().trim();
                        let value = if cell.is_empty() {
                            Value::Empty
                        } else {
                            Value::from(cell)
                        };
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect();

        Ok(Self { rows })
    }

    /// Wraps rows built elsewhere.
    #[must_use]
    pub const fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// The rows, in file order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consumes the set, returning its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

type Records = Vec<Vec<String>>;

fn read_csv(path: &Path) -> std::result::Result<Records, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

/// Reads the first worksheet. Numbers render without a trailing `.0`.
fn read_xlsx(path: &Path) -> std::result::Result<Records, String> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| e.to_string())?;
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err("workbook has no sheets".to_string());
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| format!("sheet {sheet:?}: {e}"))?;
    debug!(sheet = %sheet, "reading worksheet");

    // Ranges start at the first used cell; pad so column positions match
    // the sheet.
    let (first_row, first_column) = range.start().unwrap_or((0, 0));
    let padding = first_column as usize;
    let mut records: Records = vec![Vec::new(); first_row as usize];
    for row in range.rows() {
        let mut record = vec![String::new(); padding];
        record.extend(row.iter().map(ToString::to_string));
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_detection_with_offset() {
        let records = vec![
            vec!["", "", ""],
            vec!["", "name ", " email"],
            vec!["ignored", "Jane", "jane@example.com"],
            vec!["", "Bob"],
        ];
        let data = DataSet::from_records(&records).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.rows()[0].string_default("name", ""), "Jane");
        assert_eq!(data.rows()[0].string_default("email", ""), "jane@example.com");
        assert_eq!(data.rows()[0].len(), 2);
        assert_eq!(data.rows()[1].len(), 1);
        assert!(data.rows()[1].get("email").is_none());
    }

    #[test]
    fn test_empty_cells_and_extra_columns() {
        let records = vec![vec!["a", "b"], vec!["1", "", "extra"]];
        let data = DataSet::from_records(&records).unwrap();
        let row = &data.rows()[0];
        assert_eq!(row.get("b"), Some(&Value::Empty));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_no_header() {
        let records: Vec<Vec<&str>> = vec![vec!["", " "], vec![]];
        assert!(DataSet::from_records(&records).is_err());
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(
            &path,
            "name, email, subject\nJane, jane@example.com,\"Hello, Jane\"\nBob,bob@example.com\n",
        )
        .unwrap();

        let data = DataSet::load(&path).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.rows()[0].string_default("subject", ""), "Hello, Jane");
        assert_eq!(data.rows()[1].string_default("email", ""), "bob@example.com");
    }

    #[test]
    fn test_load_xlsx_first_sheet() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/people.xlsx");

        let data = DataSet::load(&path).unwrap();

        assert_eq!(data.len(), 2);
        let jane = &data.rows()[0];
        assert_eq!(jane.string_default("name", ""), "Jane");
        assert_eq!(jane.string_default("email", ""), "jane@example.com");
        assert_eq!(jane.string_default("balance", ""), "42");
        let bob = &data.rows()[1];
        assert_eq!(bob.string_default("email", ""), "bob@example.com");
        assert_eq!(bob.get("balance"), Some(&Value::Empty));
    }

    #[test]
    fn test_load_rejects_broken_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.xlsx");
        std::fs::write(&path, "name,email\n").unwrap();

        let err = DataSet::load(&path).unwrap_err();
        assert!(matches!(err, Error::Data { .. }));
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let err = DataSet::load("people.ods").unwrap_err();
        assert!(err.to_string().contains("unknown file type"));
    }
}
