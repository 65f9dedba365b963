//! Row enrichment: which cells are missing, how prompts are built, and the
//! pass that fills them.

mod cell_log;
mod describe;
mod missing;
mod pipeline;
mod prompt;

pub use cell_log::{
    append_cell_log, CellAction, CellLogEntry, CellLogRecord, CELL_LOG_SCHEMA_VERSION,
};
#[cfg(test)]
pub(crate) use cell_log::load_cell_log;
pub use describe::{describe_row, FIELD_SEPARATOR};
pub use missing::{is_missing, is_missing_cell, MISSING_PLACEHOLDER};
pub use pipeline::{enrich, model_error_placeholder, EnrichmentResult, DEFAULT_ROW_LIMIT};
pub use prompt::{
    default_targets, PromptTemplate, TargetColumn, DESCRIPTION_PLACEHOLDER,
    IDENTIFIED_ICT_RISKS, KEY_DEPENDENCIES, RECOMMENDED_CONTROLS,
};
