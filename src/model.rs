use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

/// Zero-based (row, column) address inside a table grid. Serialized as `[row, col]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct CellPosition {
    pub row: usize,
    pub col: usize,
}

impl CellPosition {
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl From<(usize, usize)> for CellPosition {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

impl From<CellPosition> for (usize, usize) {
    fn from(position: CellPosition) -> Self {
        (position.row, position.col)
    }
}

impl Display for CellPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Stage-1 output: one detected field inside a table grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePosition {
    #[serde(alias = "key")]
    pub label: String,
    pub value: String,
    #[serde(alias = "valuePos")]
    pub position: CellPosition,
}

/// Stage-2 output item as returned by the inference collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelMapping {
    pub old_key: String,
    pub value: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub new_key: String,
}

/// A matched field with its position re-attached; the persisted unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "old_key")]
    pub original_label: String,
    pub value: String,
    #[serde(rename = "new_key", default)]
    pub canonical_key: String,
    pub position: CellPosition,
}

impl MatchResult {
    /// Key used for the placeholder: the canonical key, or (with
    /// `label_fallback`) the original label when no vocabulary entry matched.
    #[must_use]
    pub fn placeholder_key(&self, label_fallback: bool) -> Option<&str> {
        let canonical = self.canonical_key.trim();
        if !canonical.is_empty() {
            return Some(canonical);
        }
        let label = self.original_label.trim();
        (label_fallback && !label.is_empty()).then_some(label)
    }

    #[must_use]
    pub fn is_matched(&self) -> bool {
        !self.canonical_key.trim().is_empty()
    }
}

/// All results for one unique table, addressed by its canonical ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchBatch {
    pub ordinal: usize,
    pub results: Vec<MatchResult>,
}

impl MatchBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
