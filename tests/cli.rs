//! End-to-end tests driving the `dk` binary through intake, search, stats,
//! update, delete, and annotate flows in a temporary environment.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dk_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dk");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("inbox")).unwrap();

    let config_content = format!(
        r#"[storage]
backend = "local"
root = "{root}/uploads"
include_globs = ["**/*"]
exclude_globs = []

[journal]
path = "{root}/classified_log.json"

[classifier]
training_data = "{root}/training_data.json"
"#,
        root = root.display()
    );

    let config_path = root.join("config").join("docket.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Minimal docx (ZIP) containing word/document.xml with the given paragraphs.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn write_training_data(root: &Path) {
    fs::write(
        root.join("training_data.json"),
        r#"[
            {"text": "invoice payment due net thirty", "label": "Finance > Billing > Invoice"},
            {"text": "payment reminder invoice overdue", "label": "Finance > Billing > Invoice"},
            {"text": "server outage incident postmortem", "label": "Engineering > Ops > Incident"},
            {"text": "deploy rollback incident report", "label": "Engineering > Ops > Incident"},
            {"text": "broken label", "label": "A > B"}
        ]"#,
    )
    .unwrap();
}

#[test]
fn ingest_then_list_shows_documents() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("alpha.txt"), "Alpha Report\ninvoice totals attached").unwrap();
    fs::write(inbox.join("beta.txt"), "Beta notes about deployment").unwrap();

    let (stdout, stderr, success) = run_dk(
        &config_path,
        &[
            "ingest",
            inbox.join("alpha.txt").to_str().unwrap(),
            inbox.join("beta.txt").to_str().unwrap(),
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingested: 2"), "{}", stdout);
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_dk(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("alpha.txt"));
    assert!(stdout.contains("beta.txt"));
    assert!(stdout.contains("2 document(s)"));

    // Files landed in storage too.
    assert!(tmp.path().join("uploads").join("alpha.txt").exists());
}

#[test]
fn ingest_classifies_with_training_data() {
    let (tmp, config_path) = setup_test_env();
    write_training_data(tmp.path());
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("bill.txt"), "the invoice payment is overdue").unwrap();

    run_dk(
        &config_path,
        &["ingest", inbox.join("bill.txt").to_str().unwrap()],
    );

    let (stdout, _, success) = run_dk(&config_path, &["list"]);
    assert!(success);
    assert!(
        stdout.contains("Finance > Billing > Invoice"),
        "expected classification in listing, got: {}",
        stdout
    );
}

#[test]
fn ingest_without_training_data_uses_sentinel() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("note.txt"), "plain note").unwrap();

    let (stdout, _, success) = run_dk(
        &config_path,
        &["ingest", inbox.join("note.txt").to_str().unwrap()],
    );
    assert!(success, "{}", stdout);

    let (stdout, _, _) = run_dk(&config_path, &["list"]);
    assert!(stdout.contains("Unclassified"), "{}", stdout);
}

#[test]
fn search_log_highlights_and_reports_stats() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(
        inbox.join("alpha.txt"),
        "quarterly Invoice totals are attached below",
    )
    .unwrap();
    fs::write(inbox.join("beta.txt"), "nothing to see").unwrap();

    run_dk(
        &config_path,
        &[
            "ingest",
            inbox.join("alpha.txt").to_str().unwrap(),
            inbox.join("beta.txt").to_str().unwrap(),
        ],
    );

    let (stdout, _, success) = run_dk(&config_path, &["search", "invoice"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("alpha.txt"), "{}", stdout);
    assert!(!stdout.contains("beta.txt"), "{}", stdout);
    // Original casing survives inside the highlight marker.
    assert!(stdout.contains("<mark>Invoice</mark>"), "{}", stdout);
    // Statistics block over the result set.
    assert!(stdout.contains("documents:     1"), "{}", stdout);
    // Journal search does not report timing.
    assert!(!stdout.contains("search took"), "{}", stdout);
}

#[test]
fn search_storage_reports_timing() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("alpha.txt"), "deployment checklist for friday").unwrap();

    run_dk(
        &config_path,
        &["ingest", inbox.join("alpha.txt").to_str().unwrap()],
    );

    let (stdout, _, success) = run_dk(
        &config_path,
        &["search", "deployment", "--source", "storage"],
    );
    assert!(success, "{}", stdout);
    assert!(stdout.contains("alpha.txt"), "{}", stdout);
    assert!(stdout.contains("search took"), "{}", stdout);
    // Live storage ran no classification step.
    assert!(!stdout.contains("classification:"), "{}", stdout);
}

#[test]
fn search_without_match_prints_no_results() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_dk(&config_path, &["search", "absent"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn stats_over_empty_corpus_is_zeroed() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_dk(&config_path, &["stats"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("documents:     0"), "{}", stdout);
    assert!(stdout.contains("last upload:   never"), "{}", stdout);
}

#[test]
fn stats_counts_types_and_last_upload() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("a.txt"), "one").unwrap();
    fs::write(inbox.join("b.txt"), "two").unwrap();

    run_dk(
        &config_path,
        &[
            "ingest",
            inbox.join("a.txt").to_str().unwrap(),
            inbox.join("b.txt").to_str().unwrap(),
        ],
    );

    let (stdout, _, success) = run_dk(&config_path, &["stats"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("documents:     2"), "{}", stdout);
    assert!(stdout.contains("txt"), "{}", stdout);
    assert!(!stdout.contains("last upload:   never"), "{}", stdout);
}

#[test]
fn malformed_journal_lines_are_tolerated() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("good.txt"), "valid document").unwrap();
    run_dk(
        &config_path,
        &["ingest", inbox.join("good.txt").to_str().unwrap()],
    );

    // Corrupt the journal with a truncated line.
    let journal = tmp.path().join("classified_log.json");
    let mut content = fs::read_to_string(&journal).unwrap();
    content.push_str("{\"filename\": \"trunc");
    fs::write(&journal, content).unwrap();

    let (stdout, _, success) = run_dk(&config_path, &["list"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("1 document(s)"), "{}", stdout);
}

#[test]
fn update_refreshes_and_delete_removes_both_sides() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("doc.txt"), "first body").unwrap();
    run_dk(
        &config_path,
        &["ingest", inbox.join("doc.txt").to_str().unwrap()],
    );

    // Replace the stored bytes, then update.
    fs::write(tmp.path().join("uploads").join("doc.txt"), "second body rewritten").unwrap();
    let (stdout, stderr, success) = run_dk(&config_path, &["update", "doc.txt"]);
    assert!(success, "update failed: {} {}", stdout, stderr);
    assert!(stdout.contains("update doc.txt"), "{}", stdout);

    let (stdout, _, _) = run_dk(&config_path, &["search", "rewritten"]);
    assert!(stdout.contains("doc.txt"), "{}", stdout);

    let (stdout, _, success) = run_dk(&config_path, &["delete", "doc.txt"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("storage: removed"), "{}", stdout);
    assert!(stdout.contains("journal: removed"), "{}", stdout);
    assert!(!tmp.path().join("uploads").join("doc.txt").exists());

    let (stdout, _, _) = run_dk(&config_path, &["list"]);
    assert!(stdout.contains("No documents."), "{}", stdout);
}

#[test]
fn delete_unknown_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_dk(&config_path, &["delete", "ghost.txt"]);
    assert!(!success);
}

#[test]
fn train_reports_used_and_skipped() {
    let (tmp, config_path) = setup_test_env();
    write_training_data(tmp.path());

    let (stdout, _, success) = run_dk(&config_path, &["train"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("examples loaded: 5"), "{}", stdout);
    assert!(stdout.contains("used: 4"), "{}", stdout);
    assert!(stdout.contains("skipped (malformed label): 1"), "{}", stdout);
}

#[test]
fn train_without_data_reports_error() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_dk(&config_path, &["train"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("examples loaded: 0"), "{}", stdout);
    assert!(stdout.contains("error:"), "{}", stdout);
}

#[test]
fn docx_ingest_search_and_annotate() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(
        inbox.join("memo.docx"),
        minimal_docx(&["Project kickoff memo", "the invoice and the INVOICE copy"]),
    )
    .unwrap();

    let (stdout, stderr, success) = run_dk(
        &config_path,
        &["ingest", inbox.join("memo.docx").to_str().unwrap()],
    );
    assert!(success, "ingest failed: {} {}", stdout, stderr);
    assert!(stdout.contains("ingested: 1"), "{}", stdout);

    let (stdout, _, success) = run_dk(&config_path, &["search", "kickoff"]);
    assert!(success);
    assert!(stdout.contains("memo.docx"), "{}", stdout);
    assert!(stdout.contains("<mark>kickoff</mark>"), "{}", stdout);

    let (stdout, stderr, success) = run_dk(&config_path, &["annotate", "memo.docx", "invoice"]);
    assert!(success, "annotate failed: {} {}", stdout, stderr);
    assert!(stdout.contains("occurrences: 2"), "{}", stdout);

    // The stored file was rewritten with highlight runs.
    let stored = fs::read(tmp.path().join("uploads").join("memo.docx")).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(stored.as_slice())).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    assert_eq!(xml.matches("w:highlight").count(), 2, "{}", xml);
}

#[test]
fn annotate_plain_text_is_rejected() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("note.txt"), "invoice text").unwrap();
    run_dk(
        &config_path,
        &["ingest", inbox.join("note.txt").to_str().unwrap()],
    );

    let (_, stderr, success) = run_dk(&config_path, &["annotate", "note.txt", "invoice"]);
    assert!(!success);
    assert!(stderr.contains("plain text"), "{}", stderr);
}

#[test]
fn show_prints_detail_and_fetch_writes_bytes() {
    let (tmp, config_path) = setup_test_env();
    let inbox = tmp.path().join("inbox");
    fs::write(inbox.join("alpha.txt"), "Alpha Title\nbody line").unwrap();
    run_dk(
        &config_path,
        &["ingest", inbox.join("alpha.txt").to_str().unwrap()],
    );

    let (stdout, _, success) = run_dk(&config_path, &["show", "alpha.txt"]);
    assert!(success, "{}", stdout);
    assert!(stdout.contains("title:          Alpha Title"), "{}", stdout);
    assert!(stdout.contains("filetype:       TXT"), "{}", stdout);
    assert!(stdout.contains("body line"), "{}", stdout);

    let out_path = tmp.path().join("fetched.txt");
    let (stdout, _, success) = run_dk(
        &config_path,
        &["fetch", "alpha.txt", "--output", out_path.to_str().unwrap()],
    );
    assert!(success, "{}", stdout);
    assert_eq!(
        fs::read_to_string(&out_path).unwrap(),
        "Alpha Title\nbody line"
    );
}

#[test]
fn show_missing_document_reports_error() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_dk(&config_path, &["show", "ghost.txt"]);
    assert!(!success);
    assert!(stderr.contains("Error:"), "{}", stderr);
}
