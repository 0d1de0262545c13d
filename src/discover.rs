use crate::document::{CellSpan, DocumentTree};

/// One cell captured during discovery: its representation handle, text blocks
/// and merge span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellNode<C> {
    pub handle: C,
    pub blocks: Vec<String>,
    pub span: CellSpan,
}

impl<C> CellNode<C> {
    /// Newline-joined text blocks, trimmed.
    #[must_use]
    pub fn text(&self) -> String {
        self.blocks.join("\n").trim().to_string()
    }
}

/// A table found in a document, with a hierarchical id such as `table_2_table_1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNode<C> {
    pub id: String,
    pub parent_id: Option<String>,
    pub rows: Vec<Vec<CellNode<C>>>,
}

impl<C> TableNode<C> {
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> Option<&CellNode<C>> {
        self.rows.get(row)?.get(col)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.id.matches("table_").count().saturating_sub(1)
    }
}

/// Lists every table in `tree`: top-level tables in document order, each
/// followed depth-first by the tables nested in its cells.
pub fn discover_tables<T: DocumentTree>(tree: &T) -> Vec<TableNode<T::CellRef>> {
    let mut tables = Vec::new();
    for (index, table) in tree.top_level_tables().iter().enumerate() {
        visit(tree, table, format!("table_{}", index + 1), None, &mut tables);
    }
    tables
}

fn visit<T: DocumentTree>(
    tree: &T,
    table: &T::TableRef,
    id: String,
    parent_id: Option<String>,
    out: &mut Vec<TableNode<T::CellRef>>,
) {
    let handles = tree.table_rows(table);
    let rows = handles
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| CellNode {
                    handle: cell.clone(),
                    blocks: tree.cell_blocks(cell),
                    span: tree.cell_span(cell),
                })
                .collect()
        })
        .collect();

    out.push(TableNode {
        id: id.clone(),
        parent_id,
        rows,
    });

    let mut nested_count = 0_usize;
    for cell in handles.iter().flatten() {
        for nested in tree.cell_tables(cell) {
            nested_count += 1;
            visit(
                tree,
                &nested,
                format!("{id}_table_{nested_count}"),
                Some(id.clone()),
                out,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::discover_tables;
    use crate::document::{Cell, CellSpan, Document, Table};

    #[test]
    fn empty_document_has_no_tables() {
        assert!(discover_tables(&Document::default()).is_empty());
    }

    #[test]
    fn nested_tables_follow_their_parent_with_path_ids() {
        let deep = Table::from_text([["deep"]]);
        let inner = Table {
            rows: vec![vec![Cell::text("inner").with_table(deep)]],
        };
        let first = Table {
            rows: vec![
                vec![Cell::text("a"), Cell::text("b")],
                vec![Cell::text("c"), Cell::text("").with_table(inner)],
            ],
        };
        let second = Table::from_text([["z"]]);
        let document = Document::new(vec![first, second]);

        let tables = discover_tables(&document);
        let ids = tables.iter().map(|table| table.id.as_str()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["table_1", "table_1_table_1", "table_1_table_1_table_1", "table_2"]
        );
        assert_eq!(tables[1].parent_id.as_deref(), Some("table_1"));
        assert_eq!(tables[2].depth(), 2);
    }

    #[test]
    fn discovery_is_repeatable() {
        let document = Document::new(vec![Table::from_text([["a", "b"]])]);
        assert_eq!(discover_tables(&document), discover_tables(&document));
    }

    #[test]
    fn cell_text_joins_blocks() {
        let document = Document::new(vec![Table {
            rows: vec![vec![Cell {
                blocks: vec!["  John".to_string(), "Smith  ".to_string()],
                tables: Vec::new(),
                span: CellSpan::default(),
            }]],
        }]);
        let tables = discover_tables(&document);
        assert_eq!(tables[0].rows[0][0].text(), "John\nSmith");
    }
}
