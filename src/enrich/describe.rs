//! Renders one asset row as a single line of `column: value` pairs.
use super::missing::{is_missing, MISSING_PLACEHOLDER};
use crate::table::RowRef;

pub const FIELD_SEPARATOR: &str = ", ";

/// Every column of the row, in schema order; missing values render as `N/A`.
pub fn describe_row(row: &RowRef<'_>) -> String {
    row.iter()
        .map(|(column, value)| format!("{column}: {}", display_value(value)))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

pub(crate) fn display_value(value: &str) -> &str {
    if is_missing(value) {
        MISSING_PLACEHOLDER
    } else {
        value.trim()
    }
}
