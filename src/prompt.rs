use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::TemplateError;
use crate::grid::Grid;
use crate::inference::ChatMessage;
use crate::model::KeyValuePosition;
use crate::options::TemplateOptions;

const EXTRACT_TEMPLATE: &str = include_str!("../prompts/extract_table.md");
const MATCH_TEMPLATE: &str = include_str!("../prompts/match_table.md");

const SYSTEM_INSTRUCTION: &str = "You convert filled-in forms into reusable templates. \
Follow the requested output format exactly and answer with JSON only.";

const GRID_SLOT: &str = "{{TABLE_GRID}}";
const PAIRS_SLOT: &str = "{{FIELD_PAIRS}}";
const VOCABULARY_SLOT: &str = "{{VOCABULARY}}";

/// Label and value sent to stage 2; positions stay out of the matching request.
#[derive(Debug, Serialize)]
struct FieldPair<'a> {
    label: &'a str,
    value: &'a str,
}

/// Request templates for the extraction and matching stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    extract: String,
    matching: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            extract: EXTRACT_TEMPLATE.to_string(),
            matching: MATCH_TEMPLATE.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in templates, replaced by any template files named in `options`.
    pub fn load(options: &TemplateOptions) -> Result<Self, TemplateError> {
        let mut prompts = Self::default();
        if let Some(path) = &options.extract_prompt {
            prompts.extract = read_template(path, &[GRID_SLOT])?;
        }
        if let Some(path) = &options.match_prompt {
            prompts.matching = read_template(path, &[PAIRS_SLOT, VOCABULARY_SLOT])?;
        }
        Ok(prompts)
    }

    #[must_use]
    pub fn extract_request(&self, grid: &Grid) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(self.extract.replace(GRID_SLOT, &grid.to_prompt_text())),
        ]
    }

    #[must_use]
    pub fn match_request(&self, fields: &[KeyValuePosition], vocabulary: &str) -> Vec<ChatMessage> {
        let pairs = fields
            .iter()
            .map(|field| FieldPair {
                label: &field.label,
                value: &field.value,
            })
            .collect::<Vec<_>>();
        let pairs = serde_json::to_string_pretty(&pairs).unwrap_or_else(|_| "[]".to_string());

        let content = self
            .matching
            .replace(VOCABULARY_SLOT, vocabulary.trim())
            .replace(PAIRS_SLOT, &pairs);
        vec![
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(content),
        ]
    }
}

fn read_template(path: &Path, required_slots: &[&str]) -> Result<String, TemplateError> {
    let template = fs::read_to_string(path)?;
    if let Some(missing) = required_slots.iter().find(|slot| !template.contains(**slot)) {
        return Err(TemplateError::InvalidOption(format!(
            "prompt template {} lacks the {missing} slot",
            path.display()
        )));
    }
    Ok(template)
}
