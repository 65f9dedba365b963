use super::*;
use crate::enrich::{load_cell_log, CellAction, IDENTIFIED_ICT_RISKS};
use crate::store::{FetchedFile, StoredFile};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// (name, folder, bytes) of one persist call.
type Persisted = (String, Option<String>, Vec<u8>);

#[derive(Default)]
struct MemoryStore {
    files: HashMap<String, FetchedFile>,
    persisted: Mutex<Vec<Persisted>>,
    fail_persist: bool,
}

impl MemoryStore {
    fn with_file(id: &str, name: &str, bytes: &[u8]) -> Self {
        let mut store = Self::default();
        store.files.insert(
            id.to_string(),
            FetchedFile {
                name: name.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        store
    }
}

impl TableStore for MemoryStore {
    fn fetch(&self, file_id: &str) -> Result<FetchedFile, StoreError> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))
    }

    fn persist(
        &self,
        name: &str,
        _content_type: &str,
        bytes: &[u8],
        folder: Option<&str>,
    ) -> Result<StoredFile, StoreError> {
        if self.fail_persist {
            return Err(StoreError::Persist("quota exceeded".to_string()));
        }
        self.persisted.lock().unwrap().push((
            name.to_string(),
            folder.map(str::to_string),
            bytes.to_vec(),
        ));
        Ok(StoredFile {
            id: "out-1".to_string(),
            link: format!("memory://{name}"),
        })
    }
}

struct CountingModel {
    calls: AtomicUsize,
}

impl ModelQuery for CountingModel {
    fn query(&self, _prompt: &str) -> anyhow::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("answer {n}"))
    }
}

const INVENTORY_CSV: &[u8] = b"Asset Name,Identified ICT Risks\nCore Banking DB,\nPayments Hub,Fraud\n";

fn context(store: MemoryStore) -> (AnalysisContext, Arc<CountingModel>) {
    let model = Arc::new(CountingModel {
        calls: AtomicUsize::new(0),
    });
    let config = ServiceConfig {
        targets: vec![crate::enrich::TargetColumn::new(
            IDENTIFIED_ICT_RISKS,
            "Risks for {Asset Name}",
        )],
        ..ServiceConfig::default()
    };
    let ctx = AnalysisContext::new(config, Arc::new(store), model.clone());
    (ctx, model)
}

fn request(mode: OutputMode) -> AnalyzeRequest {
    AnalyzeRequest {
        mode: Some(mode),
        ..AnalyzeRequest::new("inv-1")
    }
}

#[test]
fn preview_mode_never_calls_the_model() {
    let (ctx, model) = context(MemoryStore::with_file("inv-1", "assets.csv", INVENTORY_CSV));

    let response = ctx.run_analysis(&request(OutputMode::PreviewOnly)).unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    let preview = response.file_preview.unwrap();
    assert_eq!(preview.len(), 2);
    assert_eq!(preview[0]["Asset Name"], "Core Banking DB");
    assert!(response.analysis.is_none());
    assert!(response.model_queries.is_none());
}

#[test]
fn inline_analysis_returns_input_and_enriched_rows() {
    let (ctx, model) = context(MemoryStore::with_file("inv-1", "assets.csv", INVENTORY_CSV));

    let response = ctx.run_analysis(&request(OutputMode::InlineAnalysis)).unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.model_queries, Some(1));
    let preview = response.file_preview.unwrap();
    assert_eq!(preview[0][IDENTIFIED_ICT_RISKS], "");
    let analysis = response.analysis.unwrap();
    assert_eq!(analysis[0][IDENTIFIED_ICT_RISKS], "answer 0");
    assert_eq!(analysis[1][IDENTIFIED_ICT_RISKS], "Fraud");
    assert!(response.download_link.is_none());
}

#[test]
fn export_uploads_updated_file_into_folder() {
    let store = MemoryStore::with_file("inv-1", "assets.csv", INVENTORY_CSV);
    let model = Arc::new(CountingModel {
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(store);
    let ctx = AnalysisContext::new(ServiceConfig::default(), store.clone(), model);
    let req = AnalyzeRequest {
        output_folder_id: Some(" folder-9 ".to_string()),
        ..AnalyzeRequest::new("inv-1")
    };

    let response = ctx.run_analysis(&req).unwrap();

    assert_eq!(
        response.download_link.as_deref(),
        Some("memory://assets_updated.csv")
    );
    // Three default targets: one kept cell, five filled.
    assert_eq!(response.model_queries, Some(5));
    assert!(response.file_preview.is_none());

    let persisted = store.persisted.lock().unwrap();
    let (name, folder, bytes) = &persisted[0];
    assert_eq!(name, "assets_updated.csv");
    assert_eq!(folder.as_deref(), Some("folder-9"));
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.starts_with(
        "Asset Name,Identified ICT Risks,Recommended Controls,Key Dependencies\n"
    ));
    assert!(text.contains("Payments Hub,Fraud,"));
}

#[test]
fn request_row_limit_only_lowers_the_cap() {
    let csv = b"Asset Name\na\nb\nc\n";
    let (ctx, model) = context(MemoryStore::with_file("inv-1", "assets.csv", csv));

    let lowered = AnalyzeRequest {
        row_limit: Some(2),
        ..request(OutputMode::InlineAnalysis)
    };
    let response = ctx.run_analysis(&lowered).unwrap();
    assert_eq!(response.analysis.unwrap().len(), 2);
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);

    let raised = AnalyzeRequest {
        row_limit: Some(500),
        ..request(OutputMode::PreviewOnly)
    };
    let response = ctx.run_analysis(&raised).unwrap();
    assert_eq!(response.file_preview.unwrap().len(), 3);
}

#[test]
fn blank_file_id_and_zero_row_limit_are_invalid() {
    let (ctx, _) = context(MemoryStore::default());
    let err = ctx.run_analysis(&AnalyzeRequest::new("   ")).unwrap_err();
    assert!(matches!(err, RequestError::InvalidRequest(_)));
    assert_eq!(
        err.body(),
        ErrorBody {
            error: "Invalid request".to_string(),
            details: "file_id must be non-empty".to_string(),
        }
    );
    let zero = AnalyzeRequest {
        row_limit: Some(0),
        ..AnalyzeRequest::new("inv-1")
    };
    assert!(matches!(
        ctx.run_analysis(&zero),
        Err(RequestError::InvalidRequest(_))
    ));
}

#[test]
fn missing_file_is_a_download_error() {
    let (ctx, _) = context(MemoryStore::default());
    let err = ctx.run_analysis(&AnalyzeRequest::new("ghost")).unwrap_err();
    assert!(matches!(err, RequestError::Download(StoreError::NotFound(_))));
    let body = err.body();
    assert_eq!(body.error, "Failed to download file");
    assert_eq!(body.details, "file ghost not found");
}

#[test]
fn unsupported_or_broken_files_are_parse_errors() {
    let (ctx, _) = context(MemoryStore::with_file("inv-1", "notes.txt", b"hello"));
    assert!(matches!(
        ctx.run_analysis(&AnalyzeRequest::new("inv-1")),
        Err(RequestError::Parse(SheetError::Unsupported(_)))
    ));

    let (ctx, model) = context(MemoryStore::with_file("inv-1", "assets.xlsx", b"garbage"));
    let err = ctx.run_analysis(&AnalyzeRequest::new("inv-1")).unwrap_err();
    assert_eq!(err.body().error, "Failed to process spreadsheet");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn upload_failure_is_reported() {
    let store = MemoryStore {
        fail_persist: true,
        ..MemoryStore::with_file("inv-1", "assets.csv", INVENTORY_CSV)
    };
    let (ctx, _) = context(store);
    let err = ctx.run_analysis(&AnalyzeRequest::new("inv-1")).unwrap_err();
    assert_eq!(
        err.body(),
        ErrorBody {
            error: "Failed to upload file".to_string(),
            details: "persist failed: quota exceeded".to_string(),
        }
    );
}

#[test]
fn cell_log_is_appended_per_request() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("cells.jsonl");
    let model = Arc::new(CountingModel {
        calls: AtomicUsize::new(0),
    });
    let config = ServiceConfig {
        cell_log: Some(log_path.clone()),
        targets: vec![crate::enrich::TargetColumn::new(IDENTIFIED_ICT_RISKS, "{description}")],
        ..ServiceConfig::default()
    };
    let store = MemoryStore::with_file("inv-1", "assets.csv", INVENTORY_CSV);
    let ctx = AnalysisContext::new(config, Arc::new(store), model);

    ctx.run_analysis(&request(OutputMode::InlineAnalysis)).unwrap();

    let records = load_cell_log(&log_path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].source, "inv-1");
    assert_eq!(records[0].entry.action, CellAction::Filled);
    assert_eq!(records[1].entry.action, CellAction::Kept);
}

#[test]
fn output_mode_uses_snake_case_names() {
    let mode: OutputMode = serde_json::from_str("\"inline_analysis\"").unwrap();
    assert_eq!(mode, OutputMode::InlineAnalysis);
    assert_eq!(
        serde_json::to_string(&OutputMode::ExportAndUpload).unwrap(),
        "\"export_and_upload\""
    );
    assert_eq!(OutputMode::default(), OutputMode::ExportAndUpload);
}
