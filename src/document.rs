//! Document tree collaborator interface and the in-memory document representation.
//!
//! Discovery, deduplication and replacement only talk to a document through
//! [`DocumentTree`] and [`DocumentTreeMut`], so extraction and replacement can run
//! against two different representations of the same content.

use serde::{Deserialize, Serialize};

/// Read-only view of tables, rows, cells and nested tables.
pub trait DocumentTree {
    type TableRef: Clone;
    type CellRef: Clone;

    /// Tables that are not nested in any cell, in document order.
    fn top_level_tables(&self) -> Vec<Self::TableRef>;

    /// Rows of `table`, each an ordered list of its cells. Rows of nested tables
    /// are not included.
    fn table_rows(&self, table: &Self::TableRef) -> Vec<Vec<Self::CellRef>>;

    /// Text blocks of `cell`, excluding text that belongs to nested tables.
    fn cell_blocks(&self, cell: &Self::CellRef) -> Vec<String>;

    /// Tables nested directly inside `cell`, in document order.
    fn cell_tables(&self, cell: &Self::CellRef) -> Vec<Self::TableRef>;

    /// Rows and columns `cell` is merged across.
    fn cell_span(&self, _cell: &Self::CellRef) -> CellSpan {
        CellSpan::default()
    }
}

/// Extent of a merged cell. Positions still count cells as they appear in
/// their row; the span only describes the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellSpan {
    pub rows: usize,
    pub cols: usize,
}

impl CellSpan {
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.rows <= 1 && self.cols <= 1
    }
}

impl Default for CellSpan {
    fn default() -> Self {
        Self { rows: 1, cols: 1 }
    }
}

pub trait DocumentTreeMut: DocumentTree {
    /// Replaces the text content of `cell`, keeping its nested tables.
    /// Returns `false` when the handle no longer resolves to a cell.
    fn set_cell_text(&mut self, cell: &Self::CellRef, text: &str) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CellRepr")]
pub struct Cell {
    pub blocks: Vec<String>,
    pub tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "CellSpan::is_single")]
    pub span: CellSpan,
}

/// Cells may be written as a bare string in JSON documents.
#[derive(Deserialize)]
#[serde(untagged)]
enum CellRepr {
    Text(String),
    Full {
        #[serde(default)]
        blocks: Vec<String>,
        #[serde(default)]
        tables: Vec<Table>,
        #[serde(default)]
        span: CellSpan,
    },
}

impl From<CellRepr> for Cell {
    fn from(repr: CellRepr) -> Self {
        match repr {
            CellRepr::Text(text) => Self::text(text),
            CellRepr::Full {
                blocks,
                tables,
                span,
            } => Self {
                blocks,
                tables,
                span,
            },
        }
    }
}

impl Cell {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![text.into()],
            tables: Vec::new(),
            span: CellSpan::default(),
        }
    }

    #[must_use]
    pub fn with_span(mut self, rows: usize, cols: usize) -> Self {
        self.span = CellSpan { rows, cols };
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }
}

impl Table {
    /// Builds a table of single-block cells.
    #[must_use]
    pub fn from_text<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Cell::text).collect())
                .collect(),
        }
    }

    fn snapshot<T: DocumentTree>(tree: &T, table: &T::TableRef) -> Self {
        let rows = tree
            .table_rows(table)
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| Cell {
                        blocks: tree.cell_blocks(cell),
                        tables: tree
                            .cell_tables(cell)
                            .iter()
                            .map(|nested| Self::snapshot(tree, nested))
                            .collect(),
                        span: tree.cell_span(cell),
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }
}

impl Document {
    #[must_use]
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    /// Copies the table structure and cell text of any tree into a new document.
    #[must_use]
    pub fn snapshot<T: DocumentTree>(tree: &T) -> Self {
        Self {
            tables: tree
                .top_level_tables()
                .iter()
                .map(|table| Table::snapshot(tree, table))
                .collect(),
        }
    }

    #[must_use]
    pub fn table(&self, path: &TablePath) -> Option<&Table> {
        let mut table = self.tables.get(path.top)?;
        for step in &path.nested {
            table = table
                .rows
                .get(step.row)?
                .get(step.col)?
                .tables
                .get(step.index)?;
        }
        Some(table)
    }

    fn table_mut(&mut self, path: &TablePath) -> Option<&mut Table> {
        let mut table = self.tables.get_mut(path.top)?;
        for step in &path.nested {
            table = table
                .rows
                .get_mut(step.row)?
                .get_mut(step.col)?
                .tables
                .get_mut(step.index)?;
        }
        Some(table)
    }

    #[must_use]
    pub fn cell(&self, path: &CellPath) -> Option<&Cell> {
        self.table(&path.table)?.rows.get(path.row)?.get(path.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NestedStep {
    row: usize,
    col: usize,
    index: usize,
}

/// Index path from a top-level table through cells to a nested table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePath {
    top: usize,
    nested: Vec<NestedStep>,
}

impl TablePath {
    #[must_use]
    pub fn top(index: usize) -> Self {
        Self {
            top: index,
            nested: Vec::new(),
        }
    }

    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> CellPath {
        CellPath {
            table: self.clone(),
            row,
            col,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellPath {
    table: TablePath,
    row: usize,
    col: usize,
}

impl CellPath {
    fn nested_table(&self, index: usize) -> TablePath {
        let mut path = self.table.clone();
        path.nested.push(NestedStep {
            row: self.row,
            col: self.col,
            index,
        });
        path
    }
}

impl DocumentTree for Document {
    type TableRef = TablePath;
    type CellRef = CellPath;

    fn top_level_tables(&self) -> Vec<TablePath> {
        (0..self.tables.len()).map(TablePath::top).collect()
    }

    fn table_rows(&self, table: &TablePath) -> Vec<Vec<CellPath>> {
        let Some(resolved) = self.table(table) else {
            return Vec::new();
        };
        resolved
            .rows
            .iter()
            .enumerate()
            .map(|(row, cells)| (0..cells.len()).map(|col| table.cell(row, col)).collect())
            .collect()
    }

    fn cell_blocks(&self, cell: &CellPath) -> Vec<String> {
        self.cell(cell)
            .map(|resolved| resolved.blocks.clone())
            .unwrap_or_default()
    }

    fn cell_tables(&self, cell: &CellPath) -> Vec<TablePath> {
        let count = self.cell(cell).map_or(0, |resolved| resolved.tables.len());
        (0..count).map(|index| cell.nested_table(index)).collect()
    }

    fn cell_span(&self, cell: &CellPath) -> CellSpan {
        self.cell(cell).map_or_else(CellSpan::default, |resolved| resolved.span)
    }
}

impl DocumentTreeMut for Document {
    fn set_cell_text(&mut self, cell: &CellPath, text: &str) -> bool {
        let Some(target) = self
            .table_mut(&cell.table)
            .and_then(|table| table.rows.get_mut(cell.row))
            .and_then(|row| row.get_mut(cell.col))
        else {
            return false;
        };
        target.blocks = vec![text.to_string()];
        true
    }
}
