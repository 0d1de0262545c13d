//! Match artifacts on disk: one `table_{ordinal}_matches.json` per unique table
//! that produced results, plus a `tables.json` index for inspection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::dedup::Deduplicated;
use crate::error::TemplateError;
use crate::model::{MatchBatch, MatchResult};
use crate::warning::{Diagnostic, DiagnosticCode};

pub const INDEX_FILE: &str = "tables.json";

static BATCH_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^table_(\d+)_matches\.json$").expect("hardcoded batch file regex is valid")
});

#[must_use]
pub fn batch_file_name(ordinal: usize) -> String {
    format!("table_{ordinal}_matches.json")
}

/// Empties `dir`, creating it when absent. Runs are not incremental.
pub fn prepare_output_dir(dir: &Path) -> Result<(), TemplateError> {
    let wrap = |source: io::Error| TemplateError::OutputDirectory {
        path: dir.to_path_buf(),
        source,
    };

    if dir.exists() {
        for entry in fs::read_dir(dir).map_err(wrap)? {
            let path = entry.map_err(wrap)?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(wrap)?;
            } else {
                fs::remove_file(&path).map_err(wrap)?;
            }
        }
    } else {
        fs::create_dir_all(dir).map_err(wrap)?;
    }
    Ok(())
}

pub fn write_batch(dir: &Path, batch: &MatchBatch) -> Result<PathBuf, TemplateError> {
    let path = dir.join(batch_file_name(batch.ordinal));
    let json = serde_json::to_string_pretty(&batch.results)?;
    fs::write(&path, json)?;
    tracing::debug!(path = %path.display(), results = batch.results.len(), "match batch written");
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableIndexEntry {
    pub ordinal: usize,
    pub id: String,
    pub fingerprint: String,
    pub duplicates: Vec<String>,
    pub rows: usize,
    pub columns: Vec<usize>,
}

#[must_use]
pub fn table_index<C>(unique: &Deduplicated<C>) -> Vec<TableIndexEntry> {
    unique
        .tables
        .iter()
        .map(|table| TableIndexEntry {
            ordinal: table.ordinal,
            id: table.table.id.clone(),
            fingerprint: table.fingerprint.to_string(),
            duplicates: table.duplicates.iter().map(|copy| copy.id.clone()).collect(),
            rows: table.table.rows.len(),
            columns: table.table.rows.iter().map(Vec::len).collect(),
        })
        .collect()
}

pub fn write_index<C>(dir: &Path, unique: &Deduplicated<C>) -> Result<(), TemplateError> {
    let json = serde_json::to_string_pretty(&table_index(unique))?;
    fs::write(dir.join(INDEX_FILE), json)?;
    Ok(())
}

/// Reads every batch file in `dir`, ordered by ordinal. Files that cannot be
/// read or decoded are reported and skipped.
pub fn read_batches(dir: &Path) -> Result<(Vec<MatchBatch>, Vec<Diagnostic>), TemplateError> {
    if !dir.is_dir() {
        return Err(TemplateError::MissingMatchResults(dir.to_path_buf()));
    }

    let mut batches = Vec::new();
    let mut diagnostics = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(ordinal) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| BATCH_FILE_RE.captures(name))
            .and_then(|captures| captures[1].parse::<usize>().ok())
        else {
            continue;
        };

        let parsed = fs::read_to_string(&path)
            .map_err(TemplateError::from)
            .and_then(|json| Ok(serde_json::from_str::<Vec<MatchResult>>(&json)?));
        match parsed {
            Ok(results) => batches.push(MatchBatch { ordinal, results }),
            Err(error) => diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::UnreadableBatch,
                    format!("skipping {}: {error}", path.display()),
                )
                .with_ordinal(ordinal)
                .logged(),
            ),
        }
    }

    batches.sort_by_key(|batch| batch.ordinal);
    Ok((batches, diagnostics))
}
