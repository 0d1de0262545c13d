mod common;

use std::fs;

use common::{NAME_AGE_FIELDS, NAME_AGE_MATCHES, ScriptedClient, write_file, write_vocabulary};
use pretty_assertions::assert_eq;
use table_templater::{
    CellPosition, Document, DocumentTreeMut, HtmlDocument, INDEX_FILE, Role, Table, TablePath,
    TableOutcome, TemplateError, TemplateOptions, batch_file_name, load_snapshot, match_document,
    read_batches, replace_document, template_file,
};
use tempfile::tempdir;

fn name_age() -> Table {
    Table::from_text([["Name", "John"], ["Age", "30"]])
}

fn cell_text(document: &Document, table: usize, row: usize, col: usize) -> String {
    document
        .cell(&TablePath::top(table).cell(row, col))
        .map(|cell| cell.blocks.join("\n"))
        .expect("cell should exist")
}

#[test]
fn document_without_tables_produces_no_batches() {
    let dir = tempdir().expect("tempdir should be created");
    let vocabulary = write_vocabulary(dir.path());
    let output = dir.path().join("matches");
    let mut client = ScriptedClient::default();

    let report = match_document(
        &Document::default(),
        &mut client,
        &vocabulary,
        &output,
        &TemplateOptions::default(),
    )
    .expect("matching should succeed");

    assert_eq!(report.stats.tables_processed, 0);
    assert_eq!(client.calls(), 0);
    let names = fs::read_dir(&output)
        .expect("output dir should exist")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec![INDEX_FILE.to_string()]);
}

#[test]
fn matched_cell_becomes_placeholder_and_unmatched_cell_is_kept() {
    let dir = tempdir().expect("tempdir should be created");
    let vocabulary = write_vocabulary(dir.path());
    let output = dir.path().join("matches");
    let mut document = Document::new(vec![name_age()]);
    let mut client = ScriptedClient::new([NAME_AGE_FIELDS, NAME_AGE_MATCHES]);

    let report = match_document(
        &document,
        &mut client,
        &vocabulary,
        &output,
        &TemplateOptions::default(),
    )
    .expect("matching should succeed");
    assert_eq!(report.stats.tables_with_matches, 1);
    assert_eq!(report.stats.fields_matched, 1);
    assert!(output.join(batch_file_name(1)).is_file());

    let stage_two = &client.requests[1];
    assert_eq!(stage_two[0].role, Role::System);
    assert!(stage_two[1].content.contains("applicant_name"));
    assert!(!stage_two[1].content.contains("position"));

    let replaced = replace_document(&mut document, &output, &TemplateOptions::default())
        .expect("replacement should succeed");
    assert_eq!(replaced.stats.cells_replaced, 1);
    assert_eq!(cell_text(&document, 0, 0, 1), "[applicant_name]");
    assert_eq!(cell_text(&document, 0, 1, 1), "30");
    assert_eq!(cell_text(&document, 0, 0, 0), "Name");
}

#[test]
fn exhausted_extraction_skips_table_and_continues() {
    let dir = tempdir().expect("tempdir should be created");
    let vocabulary = write_vocabulary(dir.path());
    let output = dir.path().join("matches");
    let document = Document::new(vec![
        Table::from_text([["Remarks", "see attached"]]),
        name_age(),
    ]);
    let mut client = ScriptedClient::new([
        "I could not find any fields.",
        "Still nothing useful here",
        NAME_AGE_FIELDS,
        NAME_AGE_MATCHES,
    ]);

    let report = match_document(
        &document,
        &mut client,
        &vocabulary,
        &output,
        &TemplateOptions::default(),
    )
    .expect("matching should succeed");

    assert_eq!(client.calls(), 4);
    assert_eq!(client.requests[0], client.requests[1]);
    assert_eq!(report.tables[0].outcome, TableOutcome::ExtractExhausted);
    assert_eq!(report.tables[0].transcript.len(), 2);
    assert_eq!(report.tables[1].outcome, TableOutcome::Matched);
    assert!(!output.join(batch_file_name(1)).exists());
    assert!(output.join(batch_file_name(2)).is_file());
}

#[test]
fn identical_tables_are_matched_once_and_templated_everywhere() {
    let dir = tempdir().expect("tempdir should be created");
    let vocabulary = write_vocabulary(dir.path());
    let output = dir.path().join("matches");
    let mut document = Document::new(vec![name_age(), name_age()]);
    let mut client = ScriptedClient::new([NAME_AGE_FIELDS, NAME_AGE_MATCHES]);

    let report = match_document(
        &document,
        &mut client,
        &vocabulary,
        &output,
        &TemplateOptions::default(),
    )
    .expect("matching should succeed");

    assert_eq!(report.stats.tables_processed, 1);
    assert_eq!(client.calls(), 2);
    assert!(output.join(batch_file_name(1)).is_file());
    assert!(!output.join(batch_file_name(2)).exists());

    replace_document(&mut document, &output, &TemplateOptions::default())
        .expect("replacement should succeed");
    assert_eq!(cell_text(&document, 0, 0, 1), "[applicant_name]");
    assert_eq!(cell_text(&document, 1, 0, 1), "[applicant_name]");
}

#[test]
fn failing_collaborator_never_aborts_the_run() {
    let dir = tempdir().expect("tempdir should be created");
    let vocabulary = write_vocabulary(dir.path());
    let output = dir.path().join("matches");
    let document = Document::new(vec![name_age()]);
    let mut client = ScriptedClient::new([NAME_AGE_FIELDS]).then_fail().then_fail();

    let report = match_document(
        &document,
        &mut client,
        &vocabulary,
        &output,
        &TemplateOptions::default(),
    )
    .expect("collaborator errors are not fatal");

    assert_eq!(report.tables[0].outcome, TableOutcome::MatchExhausted);
    assert_eq!(report.stats.tables_with_matches, 0);
    assert_eq!(client.calls(), 3);
}

#[test]
fn missing_vocabulary_halts_before_touching_output() {
    let dir = tempdir().expect("tempdir should be created");
    let output = dir.path().join("matches");
    fs::create_dir(&output).expect("output dir");
    let keep = write_file(&output, "previous.json", "[]");
    let mut client = ScriptedClient::default();

    let err = match_document(
        &Document::new(vec![name_age()]),
        &mut client,
        &dir.path().join("missing.txt"),
        &output,
        &TemplateOptions::default(),
    )
    .expect_err("missing vocabulary should fail");

    assert!(matches!(err, TemplateError::MissingVocabulary(_)));
    assert!(keep.is_file());
}

#[test]
fn out_of_bounds_rows_are_skipped_without_affecting_siblings() {
    let dir = tempdir().expect("tempdir should be created");
    let matches = dir.path().join("matches");
    fs::create_dir(&matches).expect("matches dir");
    write_file(
        &matches,
        &batch_file_name(1),
        r#"[
          {"old_key": "Ghost", "value": "x", "new_key": "ghost", "position": [12, 0]},
          {"old_key": "Name", "value": "John", "new_key": "applicant_name", "position": [0, 1]}
        ]"#,
    );
    let mut document = Document::new(vec![name_age()]);

    let report = replace_document(&mut document, &matches, &TemplateOptions::default())
        .expect("replacement should succeed");

    assert_eq!(report.stats.cells_skipped, 1);
    assert_eq!(report.stats.cells_replaced, 1);
    assert_eq!(cell_text(&document, 0, 0, 1), "[applicant_name]");
}

#[test]
fn html_template_round_trip() {
    let dir = tempdir().expect("tempdir should be created");
    let vocabulary = write_vocabulary(dir.path());
    let input = write_file(dir.path(), "form.html", common::FORM_HTML);
    let output = dir.path().join("form.template.html");
    let matches = dir.path().join("matches");
    let mut client = ScriptedClient::new([
        NAME_AGE_FIELDS,
        NAME_AGE_MATCHES,
        "[]",
        r#"[{"label": "Phone", "value": "555-0100", "position": [0, 1]}]"#,
        r#"[{"old_key": "Phone", "value": "555-0100", "new_key": "phone"}]"#,
    ]);

    let (matched, replaced) = template_file(
        &input,
        &output,
        &mut client,
        &vocabulary,
        &matches,
        &TemplateOptions::default(),
    )
    .expect("templating should succeed");

    assert_eq!(matched.stats.tables_processed, 3);
    assert_eq!(matched.tables[1].outcome, TableOutcome::NoFields);
    assert_eq!(matched.stats.fields_matched, 2);
    assert_eq!(replaced.stats.cells_replaced, 2);

    let html = fs::read_to_string(&output).expect("output should be readable");
    assert!(html.contains("[applicant_name]"), "unexpected HTML: {html}");
    assert!(html.contains("[phone]"), "unexpected HTML: {html}");
    assert!(!html.contains("John"), "unexpected HTML: {html}");
    assert!(html.contains("<td>30</td>"), "unexpected HTML: {html}");
    assert!(html.contains("Contact"), "unexpected HTML: {html}");
}

#[test]
fn persisted_positions_address_the_recorded_values() {
    let dir = tempdir().expect("tempdir should be created");
    let vocabulary = write_vocabulary(dir.path());
    let input = write_file(dir.path(), "form.html", common::FORM_HTML);
    let matches = dir.path().join("matches");
    let extraction = load_snapshot(&input).expect("snapshot should load");
    let mut client = ScriptedClient::new([
        NAME_AGE_FIELDS,
        NAME_AGE_MATCHES,
        "[]",
        r#"[{"label": "Phone", "value": "555-0100", "position": [0, 1]}]"#,
        r#"[{"old_key": "Phone", "value": "555-0100", "new_key": "phone"}]"#,
    ]);
    match_document(
        &extraction,
        &mut client,
        &vocabulary,
        &matches,
        &TemplateOptions::default(),
    )
    .expect("matching should succeed");

    // Re-read from disk: a second, independent representation of the same content.
    let replacement = Document::snapshot(&HtmlDocument::load(&input).expect("html should load"));
    let unique = table_templater::unique_tables(&replacement);
    let (batches, diagnostics) = read_batches(&matches).expect("batches should load");
    assert!(diagnostics.is_empty());
    assert_eq!(batches.len(), 2);

    for batch in &batches {
        let table = unique.get(batch.ordinal).expect("ordinal should resolve");
        for result in &batch.results {
            let CellPosition { row, col } = result.position;
            let cell = table.table.cell(row, col).expect("position in bounds");
            assert_eq!(cell.text(), result.value);
        }
    }
}

#[test]
fn replacing_twice_leaves_html_unchanged() {
    let dir = tempdir().expect("tempdir should be created");
    let matches = dir.path().join("matches");
    fs::create_dir(&matches).expect("matches dir");
    write_file(
        &matches,
        &batch_file_name(1),
        r#"[{"old_key": "Name", "value": "John", "new_key": "applicant_name", "position": [0, 1]}]"#,
    );

    let mut document = HtmlDocument::parse(common::FORM_HTML);
    let options = TemplateOptions::default();
    let first = replace_document(&mut document, &matches, &options).expect("first pass");
    let once = document.to_html();
    let second = replace_document(&mut document, &matches, &options).expect("second pass");

    assert_eq!(first.stats.cells_replaced, 1);
    assert_eq!(second.stats.cells_replaced, 0);
    assert_eq!(document.to_html(), once);
    assert!(!once.contains("[[applicant_name]]"));
}

#[test]
fn html_cells_can_be_set_through_the_mutable_tree() {
    let mut document = HtmlDocument::parse("<table><tr><td>a</td></tr></table>");
    let snapshot = Document::snapshot(&document);
    assert_eq!(cell_text(&snapshot, 0, 0, 0), "a");

    let unique = table_templater::unique_tables(&document);
    let handle = unique.tables[0].table.rows[0][0].handle;
    assert!(document.set_cell_text(&handle, "{{a}}"));
    assert!(document.to_html().contains("<td>{{a}}</td>"));
}
