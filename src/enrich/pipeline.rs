//! One enrichment pass over a table.
//!
//! Rows are visited in ascending order and target columns in declaration
//! order. A target cell is sent to the model only when it is missing, so a
//! second pass over an enriched table issues no model calls. A failed model
//! call never aborts the pass: its cell receives a `[model error: ...]`
//! placeholder and the pass moves on.
//!
//! The pipeline performs no I/O of its own. Timeouts and retries are the
//! responsibility of the injected [`ModelQuery`].
use super::cell_log::{CellAction, CellLogBuilder, CellLogEntry};
use super::describe::describe_row;
use super::missing::is_missing_cell;
use super::prompt::TargetColumn;
use crate::lm::ModelQuery;
use crate::table::{RowRef, Table};
use crate::util::truncate_string;
use anyhow::{anyhow, Result};

/// Rows processed per request unless configured otherwise.
pub const DEFAULT_ROW_LIMIT: usize = 20;

const MODEL_ERROR_DETAIL_BYTES: usize = 300;

/// The enriched table and what happened to each visited cell.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub table: Table,
    pub queries_issued: usize,
    pub log: Vec<CellLogEntry>,
}

impl EnrichmentResult {
    pub fn filled(&self) -> usize {
        self.count(CellAction::Filled)
    }

    pub fn kept(&self) -> usize {
        self.count(CellAction::Kept)
    }

    pub fn failed(&self) -> usize {
        self.count(CellAction::ModelError)
    }

    fn count(&self, action: CellAction) -> usize {
        self.log.iter().filter(|entry| entry.action == action).count()
    }
}

/// Text written into a cell whose model call failed.
pub fn model_error_placeholder(reason: &str) -> String {
    format!(
        "[model error: {}]",
        truncate_string(reason, MODEL_ERROR_DETAIL_BYTES)
    )
}

/// Fill missing target cells of the first `row_limit` rows.
///
/// Target columns absent from the table are appended in declaration order.
/// Existing non-missing cells are never overwritten.
pub fn enrich(
    mut table: Table,
    targets: &[TargetColumn],
    model: &dyn ModelQuery,
    row_limit: usize,
) -> EnrichmentResult {
    if table.row_count() > row_limit {
        tracing::info!(
            rows = table.row_count(),
            row_limit,
            "truncating table to row limit"
        );
    }
    table.truncate(row_limit);

    // Descriptions cover the columns the input declared, as they were before
    // this pass wrote anything.
    let input_columns = table.columns().to_vec();
    for target in targets {
        table.ensure_column(&target.name);
    }

    let mut queries_issued = 0;
    let mut log = Vec::with_capacity(table.row_count() * targets.len());

    for row in 0..table.row_count() {
        let snapshot: Vec<String> = table
            .row(row)
            .map(|r| r.cells()[..input_columns.len()].to_vec())
            .unwrap_or_default();
        let view = RowRef::new(&input_columns, &snapshot);
        let description = describe_row(&view);

        for target in targets {
            if !is_missing_cell(table.get(row, &target.name)) {
                tracing::debug!(row, column = %target.name, "cell already filled");
                log.push(CellLogBuilder::new(row, &target.name).kept());
                continue;
            }

            let prompt = target.template.render(&description, &view);
            let builder = CellLogBuilder::new(row, &target.name).with_prompt_preview(&prompt);
            queries_issued += 1;

            let value = match query_cell(model, &prompt) {
                Ok(answer) => {
                    tracing::info!(
                        row,
                        column = %target.name,
                        elapsed_ms = builder.elapsed_ms(),
                        "cell enriched"
                    );
                    log.push(builder.filled());
                    answer
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    tracing::warn!(
                        row,
                        column = %target.name,
                        elapsed_ms = builder.elapsed_ms(),
                        error = %reason,
                        "model query failed"
                    );
                    let placeholder = model_error_placeholder(&reason);
                    log.push(builder.model_error(reason));
                    placeholder
                }
            };
            table.set(row, &target.name, value);
        }
    }

    EnrichmentResult {
        table,
        queries_issued,
        log,
    }
}

fn query_cell(model: &dyn ModelQuery, prompt: &str) -> Result<String> {
    let answer = model.query(prompt)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(anyhow!("model returned an empty answer"));
    }
    Ok(answer.to_string())
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
