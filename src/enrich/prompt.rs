//! Target columns and their prompt templates.
//!
//! Templates are plain text with `{placeholder}` slots. `{description}` is the
//! rendered row description; any other name is looked up as a column of the
//! row being enriched and falls back to `N/A`, so rendering never fails.
use super::describe::display_value;
use super::missing::MISSING_PLACEHOLDER;
use crate::table::RowRef;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Placeholder replaced by the full row description.
pub const DESCRIPTION_PLACEHOLDER: &str = "description";

pub const IDENTIFIED_ICT_RISKS: &str = "Identified ICT Risks";
pub const RECOMMENDED_CONTROLS: &str = "Recommended Controls";
pub const KEY_DEPENDENCIES: &str = "Key Dependencies";

const IDENTIFIED_ICT_RISKS_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/identified_ict_risks.md"
));
const RECOMMENDED_CONTROLS_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/recommended_controls.md"
));
const KEY_DEPENDENCIES_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/key_dependencies.md"
));

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^{}\n]+)\}").expect("placeholder regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        placeholder_regex()
            .captures_iter(&self.text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect()
    }

    pub fn render(&self, description: &str, row: &RowRef<'_>) -> String {
        placeholder_regex()
            .replace_all(&self.text, |caps: &Captures| {
                let name = &caps[1];
                if name == DESCRIPTION_PLACEHOLDER {
                    return description.to_string();
                }
                row.get(name)
                    .map(display_value)
                    .unwrap_or(MISSING_PLACEHOLDER)
                    .to_string()
            })
            .trim()
            .to_string()
    }
}

/// A column the pipeline fills in, with the prompt used to fill it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetColumn {
    pub name: String,
    #[serde(rename = "prompt")]
    pub template: PromptTemplate,
}

impl TargetColumn {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: PromptTemplate::new(template),
        }
    }
}

/// Risks, controls and dependencies, in that order.
pub fn default_targets() -> Vec<TargetColumn> {
    vec![
        TargetColumn::new(IDENTIFIED_ICT_RISKS, IDENTIFIED_ICT_RISKS_PROMPT.trim()),
        TargetColumn::new(RECOMMENDED_CONTROLS, RECOMMENDED_CONTROLS_PROMPT.trim()),
        TargetColumn::new(KEY_DEPENDENCIES, KEY_DEPENDENCIES_PROMPT.trim()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_fixture() -> (Vec<String>, Vec<String>) {
        (
            vec!["Asset Name".to_string(), "Vendor".to_string()],
            vec!["Core Banking DB".to_string(), "NA".to_string()],
        )
    }

    #[test]
    fn description_and_column_placeholders_expand() {
        let (columns, cells) = row_fixture();
        let row = RowRef::new(&columns, &cells);
        let template = PromptTemplate::new(
            "Risks for {Asset Name} (vendor {Vendor}, site {Site}): {description}",
        );
        assert_eq!(
            template.render("Asset Name: Core Banking DB", &row),
            "Risks for Core Banking DB (vendor N/A, site N/A): Asset Name: Core Banking DB"
        );
    }

    #[test]
    fn placeholders_are_listed_in_order() {
        let template = PromptTemplate::new("{description} then {Asset Name}");
        assert_eq!(template.placeholders(), vec!["description", "Asset Name"]);
    }

    #[test]
    fn default_targets_embed_description() {
        let targets = default_targets();
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![IDENTIFIED_ICT_RISKS, RECOMMENDED_CONTROLS, KEY_DEPENDENCIES]
        );
        for target in &targets {
            assert!(target
                .template
                .placeholders()
                .contains(&DESCRIPTION_PLACEHOLDER));
        }
    }

    #[test]
    fn target_column_reads_prompt_field() {
        let target: TargetColumn = serde_json::from_value(serde_json::json!({
            "name": "Exit Strategy",
            "prompt": "Exit plan for {Asset Name}"
        }))
        .unwrap();
        assert_eq!(target.name, "Exit Strategy");
        assert_eq!(target.template.as_str(), "Exit plan for {Asset Name}");
    }
}
