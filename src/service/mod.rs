//! Request orchestration.
//!
//! One [`AnalyzeRequest`] is one sequential pass: fetch the file, parse it,
//! then depending on the [`OutputMode`] preview it, enrich it inline, or
//! enrich it and upload the result. Everything here is blocking; the HTTP
//! layer in [`http`] runs it on tokio's blocking pool.

mod http;

pub use http::{router, serve, AppState, SERVICE_NAME};

use crate::config::ServiceConfig;
use crate::enrich::{append_cell_log, enrich};
use crate::lm::{build_model, ModelQuery};
use crate::sheet::{encode_table, parse_table, updated_file_name, SheetError, SheetFormat};
use crate::store::{build_store, StoreError, TableStore};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Parsed rows only; no model calls.
    PreviewOnly,
    /// Input rows plus the enriched rows, inline.
    InlineAnalysis,
    /// Enrich, encode, upload; answer with a link.
    #[default]
    ExportAndUpload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub file_id: String,
    #[serde(default)]
    pub output_folder_id: Option<String>,
    #[serde(default)]
    pub mode: Option<OutputMode>,
    /// Lowers the configured row limit for this request; never raises it.
    #[serde(default)]
    pub row_limit: Option<usize>,
}

impl AnalyzeRequest {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            output_folder_id: None,
            mode: None,
            row_limit: None,
        }
    }
}

pub type RowRecord = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_preview: Option<Vec<RowRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Vec<RowRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_queries: Option<usize>,
}

/// Request-fatal failures. Per-cell model failures never surface here.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request")]
    InvalidRequest(String),
    #[error("Failed to download file")]
    Download(#[source] StoreError),
    #[error("Failed to process spreadsheet")]
    Parse(#[source] SheetError),
    #[error("Failed to encode spreadsheet")]
    Encode(#[source] SheetError),
    #[error("Failed to upload file")]
    Upload(#[source] StoreError),
    #[error("Internal error")]
    Internal(String),
}

/// The `{"error", "details"}` envelope every failure answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

impl RequestError {
    pub fn details(&self) -> String {
        match self {
            RequestError::InvalidRequest(details) | RequestError::Internal(details) => {
                details.clone()
            }
            RequestError::Download(err) | RequestError::Upload(err) => err.to_string(),
            RequestError::Parse(err) | RequestError::Encode(err) => err.to_string(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            details: self.details(),
        }
    }
}

/// Everything a request needs, built once at startup.
pub struct AnalysisContext {
    pub config: Arc<ServiceConfig>,
    pub store: Arc<dyn TableStore>,
    pub model: Arc<dyn ModelQuery>,
}

impl AnalysisContext {
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn TableStore>,
        model: Arc<dyn ModelQuery>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            model,
        }
    }

    /// Build the configured store and model backends.
    pub fn from_config(config: ServiceConfig) -> anyhow::Result<Self> {
        let store = build_store(&config.store)?;
        let model: Arc<dyn ModelQuery> = Arc::from(build_model(&config.model)?);
        Ok(Self::new(config, store, model))
    }

    pub fn run_analysis(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, RequestError> {
        let start = Instant::now();
        let file_id = request.file_id.trim();
        if file_id.is_empty() {
            return Err(RequestError::InvalidRequest(
                "file_id must be non-empty".to_string(),
            ));
        }
        let mode = request.mode.unwrap_or(self.config.default_mode);
        let row_limit = match request.row_limit {
            Some(0) => {
                return Err(RequestError::InvalidRequest(
                    "row_limit must be positive".to_string(),
                ))
            }
            Some(limit) => limit.min(self.config.row_limit),
            None => self.config.row_limit,
        };
        tracing::info!(file_id, mode = ?mode, row_limit, "analyze request");

        let fetched = self.store.fetch(file_id).map_err(RequestError::Download)?;
        let format = SheetFormat::from_name(&fetched.name).map_err(RequestError::Parse)?;
        let table = parse_table(&fetched.name, &fetched.bytes).map_err(RequestError::Parse)?;
        tracing::info!(
            file_id,
            name = %fetched.name,
            rows = table.row_count(),
            columns = table.columns().len(),
            "parsed spreadsheet"
        );

        let mut response = AnalyzeResponse::default();
        if mode != OutputMode::ExportAndUpload {
            response.file_preview = Some(preview_records(&table, row_limit));
        }
        if mode == OutputMode::PreviewOnly {
            return Ok(response);
        }

        let result = enrich(table, &self.config.targets, self.model.as_ref(), row_limit);
        if let Some(path) = &self.config.cell_log {
            if let Err(err) = append_cell_log(path, file_id, &result.log) {
                tracing::warn!(path = %path.display(), error = %err, "failed to append cell log");
            }
        }
        response.model_queries = Some(result.queries_issued);

        match mode {
            OutputMode::InlineAnalysis => {
                response.analysis = Some(result.table.to_records());
            }
            OutputMode::ExportAndUpload => {
                let bytes = encode_table(format, &result.table).map_err(RequestError::Encode)?;
                let name = updated_file_name(&fetched.name, format);
                let folder = request
                    .output_folder_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|folder| !folder.is_empty());
                let stored = self
                    .store
                    .persist(&name, format.content_type(), &bytes, folder)
                    .map_err(RequestError::Upload)?;
                response.download_link = Some(stored.link);
            }
            OutputMode::PreviewOnly => {}
        }

        tracing::info!(
            file_id,
            mode = ?mode,
            queries = result.queries_issued,
            filled = result.filled(),
            failed = result.failed(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "analyze complete"
        );
        Ok(response)
    }
}

fn preview_records(table: &Table, row_limit: usize) -> Vec<RowRecord> {
    table
        .rows()
        .take(row_limit)
        .map(|row| row.to_record())
        .collect()
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
