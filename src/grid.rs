use serde_json::{Value, json};

use crate::dedup::UniqueTable;
use crate::document::CellSpan;
use crate::model::CellPosition;

/// Cell text of one unique table, addressed by zero-based (row, col). Rows may
/// have different lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
    spans: Vec<Vec<CellSpan>>,
}

impl Grid {
    #[must_use]
    pub fn from_table<C>(unique: &UniqueTable<C>) -> Self {
        let rows = &unique.table.rows;
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.text()).collect())
                .collect(),
            spans: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.span).collect())
                .collect(),
        }
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn cell(&self, position: CellPosition) -> Option<&str> {
        self.rows
            .get(position.row)?
            .get(position.col)
            .map(String::as_str)
    }

    #[must_use]
    pub fn span(&self, position: CellPosition) -> CellSpan {
        self.spans
            .get(position.row)
            .and_then(|row| row.get(position.col))
            .copied()
            .unwrap_or_default()
    }

    /// True when the grid has no rows or every cell is empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.rows.iter().flatten().all(String::is_empty)
    }

    #[must_use]
    pub fn column_counts(&self) -> Vec<usize> {
        self.rows.iter().map(Vec::len).collect()
    }

    /// Renders the grid for a stage-1 request, one indexed JSON row per line.
    /// Merged cells become `{"text", "rowspan", "colspan"}` objects.
    #[must_use]
    pub fn to_prompt_text(&self) -> String {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let cells = row
                    .iter()
                    .enumerate()
                    .map(|(col, text)| {
                        let span = self.span(CellPosition::new(index, col));
                        if span.is_single() {
                            Value::String(text.clone())
                        } else {
                            json!({ "text": text, "rowspan": span.rows, "colspan": span.cols })
                        }
                    })
                    .collect::<Vec<_>>();
                let cells = serde_json::to_string(&cells).unwrap_or_else(|_| "[]".to_string());
                format!("row {index}: {cells}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<Vec<String>>> for Grid {
    fn from(rows: Vec<Vec<String>>) -> Self {
        let spans = rows
            .iter()
            .map(|row| vec![CellSpan::default(); row.len()])
            .collect();
        Self { rows, spans }
    }
}
