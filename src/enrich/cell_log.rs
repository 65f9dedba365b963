//! Per-cell enrichment log.
//!
//! Every (row, target column) pair the pipeline visits produces one entry
//! recording whether the cell was filled by the model, kept because it already
//! held an answer, or written with a model-error placeholder.
//!
//! # Audit Trail
//!
//! When a log path is configured the entries of each run are appended as
//! newline-delimited JSON, tagged with the source file they came from:
//!
//! ```jsonl
//! {"schema_version":1,"source":"1AbC","ts":1707900000000,"row":0,"column":"Key Dependencies","action":"filled","duration_ms":812}
//! {"schema_version":1,"source":"1AbC","ts":1707900000900,"row":0,"column":"Recommended Controls","action":"kept"}
//! ```
use crate::util::{now_epoch_ms, preview};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Current schema version for cell log lines.
pub const CELL_LOG_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_BYTES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellAction {
    /// The model answered and the answer was written.
    Filled,
    /// The cell already held a value; no model call was made.
    Kept,
    /// The model call failed; a diagnostic placeholder was written.
    ModelError,
}

impl fmt::Display for CellAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filled => write!(f, "filled"),
            Self::Kept => write!(f, "kept"),
            Self::ModelError => write!(f, "model_error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLogEntry {
    /// Unix timestamp in milliseconds when the entry was finished.
    pub ts: u64,

    /// Zero-based row index within the (truncated) table.
    pub row: usize,

    pub column: String,

    pub action: CellAction,

    /// Model call duration; absent for kept cells.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt_preview: Option<String>,
}

/// One line of the JSONL audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLogRecord {
    pub schema_version: u32,
    pub source: String,
    #[serde(flatten)]
    pub entry: CellLogEntry,
}

/// Times a model call and finishes it as a log entry.
pub struct CellLogBuilder {
    start: Instant,
    row: usize,
    column: String,
    prompt_preview: Option<String>,
}

impl CellLogBuilder {
    pub fn new(row: usize, column: &str) -> Self {
        Self {
            start: Instant::now(),
            row,
            column: column.to_string(),
            prompt_preview: None,
        }
    }

    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        self.prompt_preview = Some(preview(prompt, PROMPT_PREVIEW_BYTES));
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn filled(self) -> CellLogEntry {
        let duration = self.elapsed_ms();
        self.build(CellAction::Filled, Some(duration), None)
    }

    pub fn kept(self) -> CellLogEntry {
        self.build(CellAction::Kept, None, None)
    }

    pub fn model_error(self, error: impl Into<String>) -> CellLogEntry {
        let duration = self.elapsed_ms();
        self.build(CellAction::ModelError, Some(duration), Some(error.into()))
    }

    fn build(
        self,
        action: CellAction,
        duration_ms: Option<u64>,
        error: Option<String>,
    ) -> CellLogEntry {
        CellLogEntry {
            ts: now_epoch_ms(),
            row: self.row,
            column: self.column,
            action,
            duration_ms,
            error,
            prompt_preview: self.prompt_preview,
        }
    }
}

/// Append the entries of one run to the JSONL audit trail.
pub fn append_cell_log(path: &Path, source: &str, entries: &[CellLogEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create cell log directory {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open cell log for append: {}", path.display()))?;

    for entry in entries {
        let record = CellLogRecord {
            schema_version: CELL_LOG_SCHEMA_VERSION,
            source: source.to_string(),
            entry: entry.clone(),
        };
        let line = serde_json::to_string(&record).context("serialize cell log record")?;
        writeln!(file, "{line}").context("write cell log record")?;
    }

    Ok(())
}

/// Load every record from the audit trail, skipping corrupt lines.
#[cfg(test)]
pub(crate) fn load_cell_log(path: &Path) -> Result<Vec<CellLogRecord>> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("open cell log: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of cell log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CellLogRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(line = line_num + 1, error = %e, "skip corrupt cell log record");
            }
        }
    }

    Ok(records)
}
