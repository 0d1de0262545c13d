//! Two-stage matching of one table grid against the inference collaborator.
//!
//! Stage 1 extracts `{label, value, position}` triples from the grid, stage 2
//! maps each label to a canonical vocabulary key. Each stage is a bounded
//! state machine: the same request is sent at most [`MAX_STAGE_ATTEMPTS`]
//! times, every attempt is recorded in the transcript, and exhaustion degrades
//! to an empty batch for the table instead of an error.

use serde::de::DeserializeOwned;

use crate::grid::Grid;
use crate::inference::{ChatMessage, InferenceClient};
use crate::model::{KeyValuePosition, LabelMapping, MatchBatch, MatchResult};
use crate::prompt::PromptSet;
use crate::response::parse_items;
use crate::warning::{Diagnostic, DiagnosticCode};

pub const MAX_STAGE_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Match,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    CallFailed(String),
    Unparsable(String),
    Parsed(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub stage: Stage,
    pub number: usize,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    /// Every cell is empty; no request was sent.
    Blank,
    ExtractExhausted,
    /// Stage 1 succeeded with an empty array.
    NoFields,
    MatchExhausted,
    Matched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMatch {
    pub outcome: TableOutcome,
    pub batch: MatchBatch,
    pub transcript: Vec<Attempt>,
    pub diagnostics: Vec<Diagnostic>,
}

/// One stage's fixed request and its attempt history.
struct StageRun {
    stage: Stage,
    request: Vec<ChatMessage>,
    attempts: Vec<Attempt>,
}

impl StageRun {
    fn new(stage: Stage, request: Vec<ChatMessage>) -> Self {
        Self {
            stage,
            request,
            attempts: Vec::with_capacity(MAX_STAGE_ATTEMPTS),
        }
    }

    fn execute<T, C>(mut self, client: &mut C, temperature: f32) -> (Option<Vec<T>>, Vec<Attempt>)
    where
        T: DeserializeOwned,
        C: InferenceClient + ?Sized,
    {
        while self.attempts.len() < MAX_STAGE_ATTEMPTS {
            let number = self.attempts.len() + 1;
            let parsed = match client.complete(&self.request, temperature) {
                Ok(text) => {
                    tracing::debug!(
                        stage = ?self.stage,
                        attempt = number,
                        response = %text,
                        "completion received"
                    );
                    parse_items::<T>(&text)
                        .map_err(|error| AttemptOutcome::Unparsable(error.to_string()))
                }
                Err(error) => Err(AttemptOutcome::CallFailed(error.to_string())),
            };

            match parsed {
                Ok(items) => {
                    self.attempts.push(Attempt {
                        stage: self.stage,
                        number,
                        outcome: AttemptOutcome::Parsed(items.len()),
                    });
                    return (Some(items), self.attempts);
                }
                Err(outcome) => {
                    tracing::warn!(
                        stage = ?self.stage,
                        attempt = number,
                        ?outcome,
                        "stage attempt failed"
                    );
                    self.attempts.push(Attempt {
                        stage: self.stage,
                        number,
                        outcome,
                    });
                }
            }
        }
        (None, self.attempts)
    }
}

/// Drives the two-stage protocol for one table at a time. The client handle is
/// owned by the caller and reused across tables.
pub struct TableMatcher<'a, C: ?Sized> {
    client: &'a mut C,
    prompts: &'a PromptSet,
    vocabulary: &'a str,
    temperature: f32,
}

impl<'a, C: InferenceClient + ?Sized> TableMatcher<'a, C> {
    pub fn new(client: &'a mut C, prompts: &'a PromptSet, vocabulary: &'a str) -> Self {
        Self {
            client,
            prompts,
            vocabulary,
            temperature: 0.0,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn match_grid(&mut self, ordinal: usize, grid: &Grid) -> TableMatch {
        let mut table = TableMatch {
            outcome: TableOutcome::Blank,
            batch: MatchBatch {
                ordinal,
                results: Vec::new(),
            },
            transcript: Vec::new(),
            diagnostics: Vec::new(),
        };

        if grid.is_blank() {
            table.diagnostics.push(
                Diagnostic::new(DiagnosticCode::BlankTable, "table has no text; skipped")
                    .with_ordinal(ordinal),
            );
            return table;
        }

        let extract = StageRun::new(Stage::Extract, self.prompts.extract_request(grid));
        let (fields, attempts) =
            extract.execute::<KeyValuePosition, C>(&mut *self.client, self.temperature);
        table.transcript.extend(attempts);
        let Some(fields) = fields else {
            table.outcome = TableOutcome::ExtractExhausted;
            table.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::StageOneExhausted,
                    "field extraction failed on every attempt",
                )
                .with_ordinal(ordinal)
                .logged(),
            );
            return table;
        };
        if fields.is_empty() {
            table.outcome = TableOutcome::NoFields;
            table.diagnostics.push(
                Diagnostic::new(DiagnosticCode::NoFieldsFound, "no data fields found")
                    .with_ordinal(ordinal),
            );
            return table;
        }
        log_value_mismatches(ordinal, grid, &fields);

        let matching = StageRun::new(
            Stage::Match,
            self.prompts.match_request(&fields, self.vocabulary),
        );
        let (mappings, attempts) =
            matching.execute::<LabelMapping, C>(&mut *self.client, self.temperature);
        table.transcript.extend(attempts);
        let Some(mappings) = mappings else {
            table.outcome = TableOutcome::MatchExhausted;
            table.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::StageTwoExhausted,
                    "label matching failed on every attempt",
                )
                .with_ordinal(ordinal)
                .logged(),
            );
            return table;
        };

        let (results, diagnostics) = attach_positions(ordinal, &fields, mappings);
        table.outcome = TableOutcome::Matched;
        table.batch.results = results;
        table.diagnostics.extend(diagnostics);
        table
    }
}

fn log_value_mismatches(ordinal: usize, grid: &Grid, fields: &[KeyValuePosition]) {
    for field in fields {
        let cell = grid.cell(field.position);
        if cell.is_none_or(|text| !text.contains(field.value.trim())) {
            tracing::debug!(
                ordinal,
                position = %field.position,
                value = %field.value,
                cell = ?cell,
                "extracted value does not match the addressed cell"
            );
        }
    }
}

/// Joins stage-2 mappings back to stage-1 positions by label. Each stage-1
/// field is used once; an exact (label, value) pair wins over a label-only match.
fn attach_positions(
    ordinal: usize,
    fields: &[KeyValuePosition],
    mappings: Vec<LabelMapping>,
) -> (Vec<MatchResult>, Vec<Diagnostic>) {
    let mut pending = fields.iter().map(Some).collect::<Vec<_>>();
    let mut results = Vec::with_capacity(mappings.len());
    let mut diagnostics = Vec::new();

    for mapping in mappings {
        let label = mapping.old_key.trim();
        let exact = pending.iter().position(|field| {
            field.is_some_and(|field| field.label.trim() == label && field.value == mapping.value)
        });
        let index = exact.or_else(|| {
            pending
                .iter()
                .position(|field| field.is_some_and(|field| field.label.trim() == label))
        });

        let Some(field) = index.and_then(|index| pending[index].take()) else {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::UnknownLabel,
                    format!("matched label '{}' was not extracted; dropped", mapping.old_key),
                )
                .with_ordinal(ordinal)
                .logged(),
            );
            continue;
        };

        results.push(MatchResult {
            original_label: field.label.clone(),
            value: field.value.clone(),
            canonical_key: mapping.new_key.trim().to_string(),
            position: field.position,
        });
    }

    (results, diagnostics)
}
