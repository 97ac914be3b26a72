//! Spreadsheet fixtures uploaded into the application under test.
//!
//! A [`FixtureDataset`] is an ordered list of rows, each an ordered mapping
//! from column name to [`CellValue`]. It is laid out as a header row plus one
//! row per record and written to a single `Transactions` worksheet.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the worksheet the application reads from
pub const WORKSHEET_NAME: &str = "Transactions";

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture dataset has no rows")]
    Empty,

    #[error("row {row}: column '{column}' holds unsupported JSON value {value}")]
    UnsupportedValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("fixture JSON must be an array of objects")]
    NotAnArray,

    #[error("fixture column {column} is beyond what a worksheet can address")]
    TooManyColumns { column: usize },

    #[error("failed to write spreadsheet {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: XlsxError,
    },

    #[error("fixture I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

/// One record, columns kept in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureRow {
    cells: Vec<(String, CellValue)>,
}

impl FixtureRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Re-inserting a column replaces its value in place.
    pub fn with(mut self, column: &str, value: impl Into<CellValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<CellValue>) {
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| name == column) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// How the header row is derived when rows disagree on their columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderPolicy {
    /// Header is the first row's columns; columns only seen later are dropped
    #[default]
    FirstRow,
    /// Header is every column seen, in first-seen order; gaps stay blank
    Union,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureDataset {
    rows: Vec<FixtureRow>,
    header_policy: HeaderPolicy,
}

impl FixtureDataset {
    pub fn new(rows: Vec<FixtureRow>) -> Self {
        Self {
            rows,
            header_policy: HeaderPolicy::default(),
        }
    }

    pub fn with_header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.header_policy = policy;
        self
    }

    /// The three-row dataset that drives the supplier dropdown scenario:
    /// two transaction types for Supplier A, one for Supplier B.
    pub fn gst_default() -> Self {
        let row = |supplier: &str, kind: &str, gst: i64, doc: &str, date: &str| {
            FixtureRow::new()
                .with("Company Name", "TestCorp")
                .with("Month", "Jan")
                .with("Supplier Name", supplier)
                .with("Type", kind)
                .with("Total GST", gst)
                .with("Document Number (2B)", doc)
                .with("Document Date (2B)", date)
        };

        Self::new(vec![
            row("Supplier A", "Missing_2B_Cumulative", 100, "DOC001", "01-01-2024"),
            row("Supplier A", "Missing_in_PR_Cumulative", 200, "DOC002", "02-01-2024"),
            row("Supplier B", "Missing_2B_Cumulative", 50, "DOC003", "03-01-2024"),
        ])
    }

    /// Load rows from a JSON array of flat objects. Object key order is kept.
    pub fn from_json_str(json: &str) -> Result<Self, FixtureError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let records = value.as_array().ok_or(FixtureError::NotAnArray)?;

        let mut rows = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let object = record.as_object().ok_or(FixtureError::NotAnArray)?;
            let mut row = FixtureRow::new();
            for (column, value) in object {
                let cell = match value {
                    serde_json::Value::String(s) => CellValue::Text(s.clone()),
                    serde_json::Value::Number(n) => match n.as_f64() {
                        Some(n) => CellValue::Number(n),
                        None => {
                            return Err(FixtureError::UnsupportedValue {
                                row: index,
                                column: column.clone(),
                                value: n.to_string(),
                            });
                        }
                    },
                    other => {
                        return Err(FixtureError::UnsupportedValue {
                            row: index,
                            column: column.clone(),
                            value: other.to_string(),
                        });
                    }
                };
                row.insert(column, cell);
            }
            rows.push(row);
        }

        Ok(Self::new(rows))
    }

    pub fn from_json_path(path: &Path) -> Result<Self, FixtureError> {
        let json = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn rows(&self) -> &[FixtureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names for the header row
    pub fn header(&self) -> Vec<String> {
        let Some(first) = self.rows.first() else {
            return Vec::new();
        };
        let mut header: Vec<String> = first.columns().map(str::to_string).collect();

        match self.header_policy {
            HeaderPolicy::FirstRow => {
                for (index, row) in self.rows.iter().enumerate().skip(1) {
                    for column in row.columns() {
                        if !header.iter().any(|h| h == column) {
                            warn!(
                                "Row {} column '{}' is not in the header and will be dropped",
                                index, column
                            );
                        }
                    }
                }
            }
            HeaderPolicy::Union => {
                for row in self.rows.iter().skip(1) {
                    for column in row.columns() {
                        if !header.iter().any(|h| h == column) {
                            header.push(column.to_string());
                        }
                    }
                }
            }
        }

        header
    }

    /// Header row followed by one row per record, cells in header order.
    /// Missing cells are `None`.
    pub fn grid(&self) -> Vec<Vec<Option<CellValue>>> {
        let header = self.header();
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(
            header
                .iter()
                .map(|h| Some(CellValue::Text(h.clone())))
                .collect(),
        );
        for row in &self.rows {
            grid.push(header.iter().map(|h| row.get(h).cloned()).collect());
        }
        grid
    }

    /// Number of distinct `(a, b)` value pairs across all rows
    pub fn distinct_pairs(&self, a: &str, b: &str) -> usize {
        self.rows
            .iter()
            .map(|row| {
                (
                    row.get(a).map(ToString::to_string),
                    row.get(b).map(ToString::to_string),
                )
            })
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of distinct `value_column` values among rows whose
    /// `key_column` equals `key`
    pub fn distinct_values_for(&self, key_column: &str, key: &str, value_column: &str) -> usize {
        self.rows
            .iter()
            .filter(|row| row.get(key_column).is_some_and(|v| v.to_string() == key))
            .filter_map(|row| row.get(value_column).map(ToString::to_string))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Write the dataset to an `.xlsx` workbook and return a guard that
    /// deletes the file when dropped.
    pub fn write_xlsx(&self, path: &Path) -> Result<FixtureFile, FixtureError> {
        if self.rows.is_empty() {
            return Err(FixtureError::Empty);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| FixtureError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let wrap = |source: XlsxError| FixtureError::Write {
            path: path.to_path_buf(),
            source,
        };

        let grid = self.grid();
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(WORKSHEET_NAME).map_err(wrap)?;

        for (row_num, row) in grid.iter().enumerate() {
            for (col_num, cell) in row.iter().enumerate() {
                let (r, c) = (row_num as u32, column_index(col_num)?);
                match cell {
                    Some(CellValue::Text(s)) => {
                        worksheet.write_string(r, c, s).map_err(wrap)?;
                    }
                    Some(CellValue::Number(n)) => {
                        worksheet.write_number(r, c, *n).map_err(wrap)?;
                    }
                    None => {}
                }
            }
        }

        workbook.save(path).map_err(wrap)?;
        info!(
            "Wrote fixture with {} row(s) to {}",
            self.rows.len(),
            path.display()
        );

        Ok(FixtureFile {
            path: path.to_path_buf(),
        })
    }
}

/// Worksheet column for the `index`th grid column
pub fn column_index(index: usize) -> Result<u16, FixtureError> {
    u16::try_from(index).map_err(|_| FixtureError::TooManyColumns { column: index })
}

/// Owns a written fixture file and deletes it on drop
#[derive(Debug)]
pub struct FixtureFile {
    path: PathBuf,
}

impl FixtureFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. A file that is already gone is fine.
    pub fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed fixture {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Keep the file on disk and give up ownership of it
    pub fn persist(mut self) -> PathBuf {
        let path = std::mem::take(&mut self.path);
        std::mem::forget(self);
        path
    }
}

impl Drop for FixtureFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!("Failed to remove fixture {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
#[path = "fixture_test.rs"]
mod fixture_test;
