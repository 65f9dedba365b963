//! Spreadsheet codec: raw file bytes <-> [`Table`].
//!
//! Workbooks (xlsx/xlsm/xlsb/xls/ods) are read with calamine and always
//! written back as xlsx; CSV stays CSV. Only the first worksheet is read and
//! its first row is the header.
//!
//! Workbook cells keep their kind through a round trip: numbers and booleans
//! are written back as such, and date/time cells are rendered as ISO text for
//! the model and written back as dates.
use crate::table::{CellKind, Table};
use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Reader};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

const DATE_TEXT: &str = "%Y-%m-%d";
const TIME_TEXT: &str = "%H:%M:%S";
const DATETIME_TEXT: &str = "%Y-%m-%d %H:%M:%S";
const SECONDS_PER_DAY: f64 = 86_400.0;

type SheetRow = Vec<(String, CellKind)>;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unsupported spreadsheet type: {0}")]
    Unsupported(String),
    #[error("failed to parse {name}: {reason}")]
    Parse { name: String, reason: String },
    #[error("failed to encode {format} output: {reason}")]
    Encode { format: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Workbook,
}

impl SheetFormat {
    /// Pick the codec from a file name's extension (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, SheetError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if extension == "csv" {
            return Ok(SheetFormat::Csv);
        }
        if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            return Ok(SheetFormat::Workbook);
        }
        Err(SheetError::Unsupported(name.to_string()))
    }

    /// Extension of the encoded output.
    pub fn extension(self) -> &'static str {
        match self {
            SheetFormat::Csv => "csv",
            SheetFormat::Workbook => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            SheetFormat::Csv => "text/csv",
            SheetFormat::Workbook => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// `<stem>_updated.<ext>` for the output of `name`.
pub fn updated_file_name(name: &str, format: SheetFormat) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("inventory");
    format!("{stem}_updated.{}", format.extension())
}

pub fn parse_table(name: &str, bytes: &[u8]) -> Result<Table, SheetError> {
    let rows = match SheetFormat::from_name(name)? {
        SheetFormat::Csv => read_csv_rows(name, bytes)?,
        SheetFormat::Workbook => read_workbook_rows(name, bytes)?,
    };
    build_table(name, rows)
}

pub fn encode_table(format: SheetFormat, table: &Table) -> Result<Vec<u8>, SheetError> {
    match format {
        SheetFormat::Csv => encode_csv(table),
        SheetFormat::Workbook => encode_workbook(table),
    }
}

fn parse_error(name: &str, reason: impl ToString) -> SheetError {
    SheetError::Parse {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn read_csv_rows(name: &str, bytes: &[u8]) -> Result<Vec<SheetRow>, SheetError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| parse_error(name, err))?;
        rows.push(
            record
                .iter()
                .map(|value| (value.to_string(), CellKind::Text))
                .collect(),
        );
    }
    Ok(rows)
}

fn read_workbook_rows(name: &str, bytes: &[u8]) -> Result<Vec<SheetRow>, SheetError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|err| parse_error(name, err))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| parse_error(name, "workbook has no worksheets"))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|err| parse_error(name, err))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(typed_cell).collect())
        .collect())
}

fn typed_cell(cell: &Data) -> (String, CellKind) {
    match cell {
        Data::Empty => (String::new(), CellKind::Text),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            (s.clone(), CellKind::Text)
        }
        Data::Float(n) => (format_number(*n), CellKind::Number),
        Data::Int(n) => (n.to_string(), CellKind::Number),
        Data::Bool(b) => (String::from(if *b { "TRUE" } else { "FALSE" }), CellKind::Bool),
        Data::Error(e) => (format!("#{e:?}"), CellKind::Text),
        Data::DateTime(dt) => date_cell(dt),
    }
}

/// Serials under one day are times of day; durations stay plain numbers.
fn date_cell(dt: &ExcelDateTime) -> (String, CellKind) {
    let serial = dt.as_f64();
    match dt.as_datetime() {
        Some(moment) if !dt.is_duration() => {
            if serial < 1.0 {
                (moment.format(TIME_TEXT).to_string(), CellKind::Time)
            } else if moment.num_seconds_from_midnight() == 0 {
                (moment.format(DATE_TEXT).to_string(), CellKind::Date)
            } else {
                (moment.format(DATETIME_TEXT).to_string(), CellKind::DateTime)
            }
        }
        _ => (format_number(serial), CellKind::Number),
    }
}

/// Excel serial (1900 date system) for the display text of a date-like cell.
fn excel_serial(value: &str, kind: CellKind) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let moment = match kind {
        CellKind::Date => NaiveDate::parse_from_str(value, DATE_TEXT)
            .ok()?
            .and_hms_opt(0, 0, 0)?,
        CellKind::DateTime => NaiveDateTime::parse_from_str(value, DATETIME_TEXT).ok()?,
        CellKind::Time => {
            let time = NaiveTime::parse_from_str(value, TIME_TEXT).ok()?;
            return Some(f64::from(time.num_seconds_from_midnight()) / SECONDS_PER_DAY);
        }
        CellKind::Text | CellKind::Number | CellKind::Bool => return None,
    };
    Some(moment.signed_duration_since(epoch).num_seconds() as f64 / SECONDS_PER_DAY)
}

/// Integral floats print without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn build_table(name: &str, rows: Vec<SheetRow>) -> Result<Table, SheetError> {
    let mut rows = rows.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| parse_error(name, "no header row"))?;
    let columns = normalize_headers(header.into_iter().map(|(text, _)| text).collect());
    let width = columns.len();

    let mut table = Table::new(columns);
    for mut cells in rows {
        if cells.iter().all(|(text, _)| text.trim().is_empty()) {
            continue;
        }
        // Trailing blank cells past the header are layout noise, not data.
        while cells.len() > width
            && cells.last().is_some_and(|(text, _)| text.trim().is_empty())
        {
            cells.pop();
        }
        table.push_typed_row(cells).map_err(|err| parse_error(name, err))?;
    }
    Ok(table)
}

/// Blank headers become `Unnamed: <index>`; repeats get `.1`, `.2`, ...
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(raw.len());
    for (index, header) in raw.into_iter().enumerate() {
        let header = header.trim();
        let base = if header.is_empty() {
            format!("Unnamed: {index}")
        } else {
            header.to_string()
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        seen.insert(candidate.clone());
        columns.push(candidate);
    }
    columns
}

fn encode_csv(table: &Table) -> Result<Vec<u8>, SheetError> {
    let encode_error = |err: &dyn std::fmt::Display| SheetError::Encode {
        format: "csv",
        reason: err.to_string(),
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(table.columns())
        .map_err(|err| encode_error(&err))?;
    for row in table.rows() {
        writer
            .write_record(row.cells())
            .map_err(|err| encode_error(&err))?;
    }
    writer.into_inner().map_err(|err| encode_error(&err))
}

fn encode_workbook(table: &Table) -> Result<Vec<u8>, SheetError> {
    let encode_error = |reason: String| SheetError::Encode {
        format: "xlsx",
        reason,
    };
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let formats = DateFormats::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in table.columns().iter().enumerate() {
        let col = u16::try_from(col).map_err(|_| encode_error("too many columns".into()))?;
        worksheet
            .write_string_with_format(0, col, name, &header_format)
            .map_err(|err| encode_error(err.to_string()))?;
    }
    for (row_index, row) in table.rows().enumerate() {
        let row_num = u32::try_from(row_index + 1)
            .map_err(|_| encode_error("too many rows".into()))?;
        for (col_index, value) in row.cells().iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let kind = table.kind(row_index, col_index);
            let col =
                u16::try_from(col_index).map_err(|_| encode_error("too many columns".into()))?;
            write_cell(worksheet, row_num, col, value, kind, &formats)
                .map_err(|err| encode_error(err.to_string()))?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|err| encode_error(err.to_string()))
}

struct DateFormats {
    date: Format,
    time: Format,
    datetime: Format,
}

impl DateFormats {
    fn new() -> Self {
        Self {
            date: Format::new().set_num_format("yyyy-mm-dd"),
            time: Format::new().set_num_format("hh:mm:ss"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
        }
    }

    fn for_kind(&self, kind: CellKind) -> Option<&Format> {
        match kind {
            CellKind::Date => Some(&self.date),
            CellKind::Time => Some(&self.time),
            CellKind::DateTime => Some(&self.datetime),
            CellKind::Text | CellKind::Number | CellKind::Bool => None,
        }
    }
}

/// Write a cell as its source kind, falling back to text when the value no
/// longer reads as that kind.
fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &str,
    kind: CellKind,
    formats: &DateFormats,
) -> Result<(), XlsxError> {
    match kind {
        CellKind::Number => {
            if let Some(number) = value.parse::<f64>().ok().filter(|n| n.is_finite()) {
                worksheet.write_number(row, col, number)?;
                return Ok(());
            }
        }
        CellKind::Bool if matches!(value, "TRUE" | "FALSE") => {
            worksheet.write_boolean(row, col, value == "TRUE")?;
            return Ok(());
        }
        CellKind::Date | CellKind::Time | CellKind::DateTime => {
            let serial = excel_serial(value, kind);
            if let (Some(serial), Some(format)) = (serial, formats.for_kind(kind)) {
                worksheet.write_number_with_format(row, col, serial, format)?;
                return Ok(());
            }
        }
        CellKind::Bool | CellKind::Text => {}
    }
    worksheet.write_string(row, col, value)?;
    Ok(())
}
