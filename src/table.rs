//! Rectangular in-memory table of string cells.
//!
//! A `Table` owns an ordered column schema and rows that always have exactly
//! one cell per column. Lookups go through the schema first, so a column the
//! sheet never declared comes back as `None` instead of an error.
//!
//! Every cell also carries a [`CellKind`] recording what the source sheet
//! stored there, so a workbook can be written back with its numbers and
//! dates intact. Cells written through [`Table::set`] are text.
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("row {row} has {found} cells but the table declares {expected} columns")]
    RowTooWide {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// How the source sheet stored a cell. The cell text is always the
/// display form: numbers as written, dates as `YYYY-MM-DD`, times as
/// `HH:MM:SS` and date-times as `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CellKind {
    #[default]
    Text,
    Number,
    Bool,
    Date,
    Time,
    DateTime,
}

/// Ordered columns plus rows of equal width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    kinds: Vec<Vec<CellKind>>,
}

/// Borrowed view of one row against a column schema.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    cells: &'a [String],
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            kinds: Vec::new(),
        }
    }

    /// Build a table from string-like rows, padding short rows with empty cells.
    pub fn from_rows<R, S>(columns: Vec<String>, rows: R) -> Result<Self, TableError>
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row.into_iter().map(Into::into).collect())?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append a row of text cells. Short rows are padded; rows wider than
    /// the schema are rejected.
    pub fn push_row(&mut self, cells: Vec<String>) -> Result<(), TableError> {
        self.push_typed_row(cells.into_iter().map(|cell| (cell, CellKind::Text)).collect())
    }

    /// Append a row of cells with their source kinds.
    pub fn push_typed_row(&mut self, cells: Vec<(String, CellKind)>) -> Result<(), TableError> {
        if cells.len() > self.columns.len() {
            return Err(TableError::RowTooWide {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: cells.len(),
            });
        }
        let (mut values, mut kinds): (Vec<String>, Vec<CellKind>) = cells.into_iter().unzip();
        values.resize(self.columns.len(), String::new());
        kinds.resize(self.columns.len(), CellKind::Text);
        self.rows.push(values);
        self.kinds.push(kinds);
        Ok(())
    }

    /// Cell value, or `None` when the column is not part of the schema or the
    /// row does not exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|cells| cells[index].as_str())
    }

    /// Source kind of a cell; out-of-range positions read as text.
    pub fn kind(&self, row: usize, column: usize) -> CellKind {
        self.kinds
            .get(row)
            .and_then(|kinds| kinds.get(column))
            .copied()
            .unwrap_or_default()
    }

    pub fn row(&self, row: usize) -> Option<RowRef<'_>> {
        self.rows.get(row).map(|cells| RowRef {
            columns: &self.columns,
            cells,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|cells| RowRef {
            columns: &self.columns,
            cells,
        })
    }

    /// Index of `name`, appending it as an empty column when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.columns.push(name.to_string());
        for cells in &mut self.rows {
            cells.push(String::new());
        }
        for kinds in &mut self.kinds {
            kinds.push(CellKind::Text);
        }
        self.columns.len() - 1
    }

    /// Write a cell, appending the column if needed. Returns false when the
    /// row is out of range.
    pub fn set(&mut self, row: usize, column: &str, value: String) -> bool {
        if row >= self.rows.len() {
            return false;
        }
        let index = self.ensure_column(column);
        self.rows[row][index] = value;
        self.kinds[row][index] = CellKind::Text;
        true
    }

    /// Keep the first `limit` rows.
    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
        self.kinds.truncate(limit);
    }

    /// Rows as ordered JSON objects (column name -> string value).
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows().map(|row| row.to_record()).collect()
    }
}

impl<'a> RowRef<'a> {
    pub fn new(columns: &'a [String], cells: &'a [String]) -> Self {
        Self { columns, cells }
    }

    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.cells.get(index).map(String::as_str)
    }

    /// `(column, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let (columns, cells) = (self.columns, self.cells);
        columns
            .iter()
            .enumerate()
            .map(move |(index, column)| {
                let value = cells.get(index).map(String::as_str).unwrap_or("");
                (column.as_str(), value)
            })
    }

    pub fn cells(&self) -> &'a [String] {
        self.cells
    }

    pub fn to_record(&self) -> Map<String, Value> {
        self.iter()
            .map(|(column, value)| (column.to_string(), Value::String(value.to_string())))
            .collect()
    }
}
