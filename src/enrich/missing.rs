//! Decides whether a cell still needs enrichment.

/// Literal used when a missing value has to be rendered into text.
pub const MISSING_PLACEHOLDER: &str = "N/A";

/// Tokens (compared trimmed, case-insensitively) that count as "no value".
const PLACEHOLDER_TOKENS: [&str; 3] = ["N/A", "NA", "NONE"];

/// True when the trimmed value is empty or one of the placeholder tokens.
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDER_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Same as [`is_missing`], treating an absent cell as missing.
pub fn is_missing_cell(value: Option<&str>) -> bool {
    match value {
        Some(value) => is_missing(value),
        None => true,
    }
}
