use std::collections::HashSet;

use serde::Serialize;

use crate::dedup::unique_tables;
use crate::discover::TableNode;
use crate::document::DocumentTreeMut;
use crate::model::{CellPosition, MatchBatch, MatchResult};
use crate::options::TemplateOptions;
use crate::warning::{Diagnostic, DiagnosticCode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceStats {
    pub batches_applied: usize,
    pub cells_replaced: usize,
    pub cells_skipped: usize,
    pub results_unmatched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    pub stats: ReplaceStats,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReplaceReport {
    fn skip(&mut self, diagnostic: Diagnostic) {
        self.stats.cells_skipped += 1;
        self.diagnostics.push(diagnostic.logged());
    }
}

/// Writes placeholders for every batch into `tree`.
///
/// Tables are re-resolved by canonical ordinal: discovery and deduplication
/// run once against `tree` before any cell is touched, so ordinals match the
/// extraction pass as long as table content and shape are unchanged. A result
/// is only written over a cell that still holds its recorded value. Every
/// failure is local to one result.
pub fn apply_batches<T: DocumentTreeMut>(
    tree: &mut T,
    batches: &[MatchBatch],
    options: &TemplateOptions,
) -> ReplaceReport {
    let unique = unique_tables(&*tree);
    let mut report = ReplaceReport::default();
    let mut written = HashSet::new();

    for batch in batches {
        let Some(target) = unique.get(batch.ordinal) else {
            report.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::TableNotFound,
                    format!(
                        "no table with ordinal {} in a document of {} unique tables",
                        batch.ordinal,
                        unique.len()
                    ),
                )
                .with_ordinal(batch.ordinal)
                .logged(),
            );
            continue;
        };
        report.stats.batches_applied += 1;

        let mut copies = vec![&target.table];
        if options.replace_duplicates {
            copies.extend(&target.duplicates);
        }

        for result in &batch.results {
            let Some(key) = result.placeholder_key(options.label_fallback) else {
                if result.original_label.trim().is_empty() && !result.is_matched() {
                    report.skip(
                        Diagnostic::new(DiagnosticCode::EmptyKey, "result has no key or label")
                            .with_ordinal(batch.ordinal)
                            .with_position(result.position),
                    );
                } else {
                    report.stats.results_unmatched += 1;
                    tracing::debug!(
                        ordinal = batch.ordinal,
                        label = %result.original_label,
                        "no canonical key; cell left as is"
                    );
                }
                continue;
            };

            let placeholder = options.placeholder.render(key);
            for table in &copies {
                let cell_key = (table.id.clone(), result.position);
                if written.contains(&cell_key) {
                    report.skip(
                        Diagnostic::new(
                            DiagnosticCode::AlreadyTemplated,
                            format!("cell in {} was already replaced in this pass", table.id),
                        )
                        .with_ordinal(batch.ordinal)
                        .with_position(result.position),
                    );
                    continue;
                }
                let replaced = replace_cell(
                    tree,
                    table,
                    batch.ordinal,
                    result,
                    &placeholder,
                    options,
                    &mut report,
                );
                if replaced {
                    written.insert(cell_key);
                }
            }
        }
    }

    tracing::info!(
        batches = report.stats.batches_applied,
        replaced = report.stats.cells_replaced,
        skipped = report.stats.cells_skipped,
        unmatched = report.stats.results_unmatched,
        "replacement finished"
    );
    report
}

fn replace_cell<T: DocumentTreeMut>(
    tree: &mut T,
    table: &TableNode<T::CellRef>,
    ordinal: usize,
    result: &MatchResult,
    placeholder: &str,
    options: &TemplateOptions,
    report: &mut ReplaceReport,
) -> bool {
    let CellPosition { row, col } = result.position;
    let Some(cell) = table.cell(row, col) else {
        let extent = table.rows.get(row).map_or(0, Vec::len);
        report.skip(
            Diagnostic::new(
                DiagnosticCode::PositionOutOfBounds,
                format!(
                    "{} has {} rows ({extent} cells in the addressed row)",
                    table.id,
                    table.rows.len()
                ),
            )
            .with_ordinal(ordinal)
            .with_position(result.position),
        );
        return false;
    };

    let current = cell.text();
    if options.placeholder.is_placeholder(&current) {
        report.skip(
            Diagnostic::new(
                DiagnosticCode::AlreadyTemplated,
                format!("cell in {} already holds {current}", table.id),
            )
            .with_ordinal(ordinal)
            .with_position(result.position),
        );
        return false;
    }

    // A cell that no longer holds the recorded value belongs to a different
    // table than the batch was matched against.
    let value = result.value.trim();
    if !value.is_empty() && !current.contains(value) {
        report.skip(
            Diagnostic::new(
                DiagnosticCode::ValueMismatch,
                format!("cell in {} reads {current:?}, expected {value:?}", table.id),
            )
            .with_ordinal(ordinal)
            .with_position(result.position),
        );
        return false;
    }

    if !tree.set_cell_text(&cell.handle, placeholder) {
        report.skip(
            Diagnostic::new(
                DiagnosticCode::TableNotFound,
                format!("cell in {} no longer resolves", table.id),
            )
            .with_ordinal(ordinal)
            .with_position(result.position),
        );
        return false;
    }
    report.stats.cells_replaced += 1;
    true
}
