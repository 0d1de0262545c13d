mod dedup;
mod discover;
mod document;
mod error;
mod grid;
mod html;
mod inference;
mod matcher;
mod model;
mod options;
mod prompt;
mod replace;
mod response;
mod store;
mod warning;

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::store::{prepare_output_dir, table_index, write_batch, write_index};

pub use dedup::{Deduplicated, TableFingerprint, UniqueTable, deduplicate, unique_tables};
pub use discover::{CellNode, TableNode, discover_tables};
pub use document::{Cell, CellPath, CellSpan, Document, DocumentTree, DocumentTreeMut, Table, TablePath};
pub use error::TemplateError;
pub use grid::Grid;
pub use html::HtmlDocument;
pub use inference::{ChatMessage, InferenceClient, OpenAiClient, Role};
pub use matcher::{
    Attempt, AttemptOutcome, MAX_STAGE_ATTEMPTS, Stage, TableMatch, TableMatcher, TableOutcome,
};
pub use model::{CellPosition, KeyValuePosition, LabelMapping, MatchBatch, MatchResult};
pub use options::{
    API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL, InferenceConfig, PlaceholderStyle,
    TemplateOptions,
};
pub use prompt::PromptSet;
pub use replace::{ReplaceReport, ReplaceStats, apply_batches};
pub use response::{JSON_CLOSE, JSON_OPEN, ResponseError, parse_items};
pub use store::{INDEX_FILE, TableIndexEntry, batch_file_name, read_batches};
pub use warning::{Diagnostic, DiagnosticCode};

const PREVIEW_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub tables_processed: usize,
    pub tables_with_matches: usize,
    pub fields_matched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub stats: MatchStats,
    pub tables: Vec<TableMatch>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Shape and preview of one unique table, for the `tables` view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    #[serde(flatten)]
    pub entry: TableIndexEntry,
    pub depth: usize,
    pub nested_tables: usize,
    pub preview: Vec<Vec<String>>,
}

fn read_vocabulary(path: &Path) -> Result<String, TemplateError> {
    if !path.is_file() {
        return Err(TemplateError::MissingVocabulary(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}

fn validate_options(options: &TemplateOptions) -> Result<(), TemplateError> {
    if !options.temperature.is_finite() || options.temperature < 0.0 {
        return Err(TemplateError::InvalidOption(format!(
            "temperature must be a non-negative number, got {}",
            options.temperature
        )));
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
}

/// Matches every unique table of `tree` and persists one batch per table with
/// results into `output_dir`, which is cleared first.
///
/// Only configuration problems are returned as errors; a table whose stages
/// fail is recorded in the report and the run moves on.
pub fn match_document<T, C>(
    tree: &T,
    client: &mut C,
    vocabulary_path: &Path,
    output_dir: &Path,
    options: &TemplateOptions,
) -> Result<MatchReport, TemplateError>
where
    T: DocumentTree,
    C: InferenceClient + ?Sized,
{
    validate_options(options)?;
    let vocabulary = read_vocabulary(vocabulary_path)?;
    let prompts = PromptSet::load(options)?;
    prepare_output_dir(output_dir)?;

    let unique = unique_tables(tree);
    write_index(output_dir, &unique)?;
    tracing::info!(unique = unique.len(), "tables discovered");

    let mut matcher =
        TableMatcher::new(client, &prompts, &vocabulary).with_temperature(options.temperature);
    let mut report = MatchReport::default();
    for table in &unique.tables {
        let grid = Grid::from_table(table);
        let matched = matcher.match_grid(table.ordinal, &grid);
        report.stats.tables_processed += 1;

        let fields = matched
            .batch
            .results
            .iter()
            .filter(|result| result.is_matched())
            .count();
        if fields > 0 {
            report.stats.tables_with_matches += 1;
            report.stats.fields_matched += fields;
        }
        if !matched.batch.is_empty() {
            write_batch(output_dir, &matched.batch)?;
        }
        tracing::info!(
            ordinal = table.ordinal,
            id = %table.table.id,
            outcome = ?matched.outcome,
            results = matched.batch.results.len(),
            matched = fields,
            "table processed"
        );

        report.diagnostics.extend(matched.diagnostics.iter().cloned());
        report.tables.push(matched);
    }

    tracing::info!(
        processed = report.stats.tables_processed,
        with_matches = report.stats.tables_with_matches,
        fields = report.stats.fields_matched,
        "matching finished"
    );
    Ok(report)
}

/// Applies the batches stored in `match_dir` to `tree`.
pub fn replace_document<T: DocumentTreeMut>(
    tree: &mut T,
    match_dir: &Path,
    options: &TemplateOptions,
) -> Result<ReplaceReport, TemplateError> {
    let (batches, mut diagnostics) = read_batches(match_dir)?;
    let mut report = apply_batches(tree, &batches, options);
    diagnostics.append(&mut report.diagnostics);
    report.diagnostics = diagnostics;
    Ok(report)
}

/// Loads the extraction-time view of a document: JSON documents directly,
/// anything else as HTML.
pub fn load_snapshot(input: &Path) -> Result<Document, TemplateError> {
    if is_json(input) {
        return Ok(serde_json::from_str(&fs::read_to_string(input)?)?);
    }
    Ok(Document::snapshot(&HtmlDocument::load(input)?))
}

pub fn inspect_tables(input: &Path) -> Result<Vec<TableSummary>, TemplateError> {
    let document = load_snapshot(input)?;
    let unique = unique_tables(&document);
    let parent_ids = unique
        .tables
        .iter()
        .flat_map(|table| std::iter::once(&table.table).chain(&table.duplicates))
        .filter_map(|table| table.parent_id.as_deref())
        .collect::<Vec<_>>();

    Ok(unique
        .tables
        .iter()
        .zip(table_index(&unique))
        .map(|(table, entry)| TableSummary {
            depth: table.table.depth(),
            nested_tables: parent_ids
                .iter()
                .filter(|parent| **parent == entry.id)
                .count(),
            preview: Grid::from_table(table)
                .rows()
                .iter()
                .take(PREVIEW_ROWS)
                .cloned()
                .collect(),
            entry,
        })
        .collect())
}

pub fn match_file<C: InferenceClient + ?Sized>(
    input: &Path,
    client: &mut C,
    vocabulary_path: &Path,
    output_dir: &Path,
    options: &TemplateOptions,
) -> Result<MatchReport, TemplateError> {
    let document = load_snapshot(input)?;
    match_document(&document, client, vocabulary_path, output_dir, options)
}

/// Reloads `input`, applies the stored batches and writes the result to
/// `output` in the same format.
pub fn replace_file(
    input: &Path,
    output: &Path,
    match_dir: &Path,
    options: &TemplateOptions,
) -> Result<ReplaceReport, TemplateError> {
    if is_json(input) {
        let mut document: Document = serde_json::from_str(&fs::read_to_string(input)?)?;
        let report = replace_document(&mut document, match_dir, options)?;
        fs::write(output, serde_json::to_string_pretty(&document)?)?;
        return Ok(report);
    }

    let mut document = HtmlDocument::load(input)?;
    let report = replace_document(&mut document, match_dir, options)?;
    document.save(output)?;
    Ok(report)
}

/// Match then replace: the full document-to-template run.
pub fn template_file<C: InferenceClient + ?Sized>(
    input: &Path,
    output: &Path,
    client: &mut C,
    vocabulary_path: &Path,
    match_dir: &Path,
    options: &TemplateOptions,
) -> Result<(MatchReport, ReplaceReport), TemplateError> {
    let matched = match_file(input, client, vocabulary_path, match_dir, options)?;
    let replaced = replace_file(input, output, match_dir, options)?;
    Ok((matched, replaced))
}
