//! HTML document representation backed by `scraper`'s DOM.

use std::fs;
use std::path::Path;

use ego_tree::{NodeId, NodeRef};
use encoding_rs::GBK;
use scraper::node::{Element, Text};
use scraper::{Html, Node};

use crate::document::{CellSpan, DocumentTree, DocumentTreeMut};
use crate::error::TemplateError;

const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "li",
    "ul",
    "ol",
    "dl",
    "dt",
    "dd",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "pre",
    "blockquote",
    "address",
    "section",
    "article",
    "header",
    "footer",
    "caption",
];

pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    #[must_use]
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Reads an HTML file, decoding it as UTF-8 and falling back to GBK.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let bytes = fs::read(path)?;
        let source = decode_html(&bytes).ok_or_else(|| TemplateError::Decode(path.to_path_buf()))?;
        Ok(Self::parse(&source))
    }

    #[must_use]
    pub fn to_html(&self) -> String {
        self.html.html()
    }

    pub fn save(&self, path: &Path) -> Result<(), TemplateError> {
        fs::write(path, self.to_html())?;
        Ok(())
    }

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }
}

fn decode_html(bytes: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.trim_start_matches('\u{feff}').to_string());
    }

    let (decoded, _, had_errors) = GBK.decode(bytes);
    (!had_errors).then(|| decoded.into_owned())
}

fn tag_name<'a>(node: NodeRef<'a, Node>) -> Option<&'a str> {
    node.value().as_element().map(|element| element.name())
}

fn collect_tables(node: NodeRef<'_, Node>, out: &mut Vec<NodeId>) {
    for child in node.children() {
        if tag_name(child) == Some("table") {
            out.push(child.id());
        } else {
            collect_tables(child, out);
        }
    }
}

fn contains_table(node: NodeRef<'_, Node>) -> bool {
    node.descendants()
        .any(|descendant| tag_name(descendant) == Some("table"))
}

/// Everything under `node` except nested tables and the elements wrapping them.
fn collect_non_table_content(node: NodeRef<'_, Node>, out: &mut Vec<NodeId>) {
    for child in node.children() {
        if tag_name(child) == Some("table") {
            continue;
        }
        if contains_table(child) {
            collect_non_table_content(child, out);
        } else {
            out.push(child.id());
        }
    }
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<String>,
    current: String,
}

impl BlockCollector {
    fn flush(&mut self) {
        let collapsed = self.current.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            self.blocks.push(collapsed);
        }
        self.current.clear();
    }

    fn walk(&mut self, node: NodeRef<'_, Node>) {
        for child in node.children() {
            match child.value() {
                Node::Text(text) => self.current.push_str(&text.text),
                Node::Element(element) => match element.name() {
                    "table" | "br" => self.flush(),
                    name if BLOCK_TAGS.contains(&name) => {
                        self.flush();
                        self.walk(child);
                        self.flush();
                    }
                    _ => self.walk(child),
                },
                _ => {}
            }
        }
    }
}

impl DocumentTree for HtmlDocument {
    type TableRef = NodeId;
    type CellRef = NodeId;

    fn top_level_tables(&self) -> Vec<NodeId> {
        let mut tables = Vec::new();
        collect_tables(self.html.tree.root(), &mut tables);
        tables
    }

    fn table_rows(&self, table: &NodeId) -> Vec<Vec<NodeId>> {
        let Some(table) = self.node(*table) else {
            return Vec::new();
        };

        let mut rows = Vec::new();
        for child in table.children() {
            match tag_name(child) {
                Some("tr") => rows.push(child),
                Some("thead" | "tbody" | "tfoot") => rows.extend(
                    child
                        .children()
                        .filter(|inner| tag_name(*inner) == Some("tr")),
                ),
                _ => {}
            }
        }

        rows.into_iter()
            .map(|row| {
                row.children()
                    .filter(|cell| matches!(tag_name(*cell), Some("td" | "th")))
                    .map(|cell| cell.id())
                    .collect()
            })
            .collect()
    }

    fn cell_blocks(&self, cell: &NodeId) -> Vec<String> {
        let Some(cell) = self.node(*cell) else {
            return Vec::new();
        };
        let mut collector = BlockCollector::default();
        collector.walk(cell);
        collector.flush();
        collector.blocks
    }

    fn cell_tables(&self, cell: &NodeId) -> Vec<NodeId> {
        let mut tables = Vec::new();
        if let Some(cell) = self.node(*cell) {
            collect_tables(cell, &mut tables);
        }
        tables
    }

    fn cell_span(&self, cell: &NodeId) -> CellSpan {
        self.node(*cell)
            .and_then(|node| node.value().as_element())
            .map_or_else(CellSpan::default, |element| CellSpan {
                rows: span_attr(element, "rowspan"),
                cols: span_attr(element, "colspan"),
            })
    }
}

/// Missing, malformed and zero spans all count as one.
fn span_attr(element: &Element, name: &str) -> usize {
    element
        .attr(name)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|span| *span > 0)
        .unwrap_or(1)
}

impl DocumentTreeMut for HtmlDocument {
    fn set_cell_text(&mut self, cell: &NodeId, text: &str) -> bool {
        let Some(node) = self.node(*cell) else {
            return false;
        };
        if !matches!(tag_name(node), Some("td" | "th")) {
            return false;
        }

        let mut removable = Vec::new();
        collect_non_table_content(node, &mut removable);
        for id in removable {
            if let Some(mut child) = self.html.tree.get_mut(id) {
                child.detach();
            }
        }

        let Some(mut node) = self.html.tree.get_mut(*cell) else {
            return false;
        };
        node.prepend(Node::Text(Text { text: text.into() }));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{HtmlDocument, decode_html};
    use crate::document::{CellSpan, DocumentTree, DocumentTreeMut};

    const NESTED: &str = r"
        <html><body>
        <table>
          <tr><td>Name</td><td><p>John</p><p>  Smith </p></td></tr>
          <tr><td>Address</td><td>
            <table><tr><td>City</td><td>Paris<br>France</td></tr></table>
          </td></tr>
        </table>
        <p>between</p>
        <table><thead><tr><th>Total</th></tr></thead><tbody><tr><td>42</td></tr></tbody></table>
        </body></html>
    ";

    #[test]
    fn finds_top_level_tables_in_document_order() {
        let document = HtmlDocument::parse(NESTED);
        let tables = document.top_level_tables();
        assert_eq!(tables.len(), 2);

        let second = document.table_rows(&tables[1]);
        assert_eq!(second.len(), 2);
        assert_eq!(document.cell_blocks(&second[0][0]), vec!["Total"]);
    }

    #[test]
    fn splits_cell_text_on_block_boundaries_and_skips_nested_tables() {
        let document = HtmlDocument::parse(NESTED);
        let tables = document.top_level_tables();
        let rows = document.table_rows(&tables[0]);

        assert_eq!(document.cell_blocks(&rows[0][1]), vec!["John", "Smith"]);
        assert!(document.cell_blocks(&rows[1][1]).is_empty());

        let nested = document.cell_tables(&rows[1][1]);
        assert_eq!(nested.len(), 1);
        let nested_rows = document.table_rows(&nested[0]);
        assert_eq!(document.cell_blocks(&nested_rows[0][1]), vec!["Paris", "France"]);
    }

    #[test]
    fn set_cell_text_replaces_text_and_keeps_nested_tables() {
        let mut document = HtmlDocument::parse(NESTED);
        let tables = document.top_level_tables();
        let rows = document.table_rows(&tables[0]);

        assert!(document.set_cell_text(&rows[0][1], "[applicant_name]"));
        assert!(document.set_cell_text(&rows[1][1], "[address]"));

        assert_eq!(document.cell_blocks(&rows[0][1]), vec!["[applicant_name]"]);
        assert_eq!(document.cell_blocks(&rows[1][1]), vec!["[address]"]);
        assert_eq!(document.cell_tables(&rows[1][1]).len(), 1);
        assert!(document.to_html().contains("[applicant_name]"));
    }

    #[test]
    fn set_cell_text_clears_text_wrapped_around_nested_tables() {
        let mut document = HtmlDocument::parse(
            "<table><tr><td><div>John Smith<table><tr><td>x</td></tr></table></div></td></tr></table>",
        );
        let tables = document.top_level_tables();
        let rows = document.table_rows(&tables[0]);
        assert_eq!(document.cell_blocks(&rows[0][0]), vec!["John Smith"]);

        assert!(document.set_cell_text(&rows[0][0], "[applicant_name]"));
        assert_eq!(document.cell_blocks(&rows[0][0]), vec!["[applicant_name]"]);
        assert!(!document.to_html().contains("John Smith"));

        let nested = document.cell_tables(&rows[0][0]);
        assert_eq!(nested.len(), 1);
        let nested_rows = document.table_rows(&nested[0]);
        assert_eq!(document.cell_blocks(&nested_rows[0][0]), vec!["x"]);
    }

    #[test]
    fn reads_rowspan_and_colspan() {
        let document = HtmlDocument::parse(
            r#"<table><tr><td rowspan="2">Address</td><td colspan=" 3 ">x</td><td colspan="0">y</td><td rowspan="wide">z</td></tr></table>"#,
        );
        let tables = document.top_level_tables();
        let rows = document.table_rows(&tables[0]);
        assert_eq!(document.cell_span(&rows[0][0]), CellSpan { rows: 2, cols: 1 });
        assert_eq!(document.cell_span(&rows[0][1]), CellSpan { rows: 1, cols: 3 });
        assert!(document.cell_span(&rows[0][2]).is_single());
        assert!(document.cell_span(&rows[0][3]).is_single());
    }

    #[test]
    fn decodes_gbk_fallback() {
        let (bytes, _, _) = encoding_rs::GBK.encode("<td>姓名</td>");
        let decoded = decode_html(&bytes).expect("gbk should decode");
        assert_eq!(decoded, "<td>姓名</td>");
    }
}
