use codebase_mirror::core::{verify_stream, AnalysisRecord, FileKind, RecordSchema};
use codebase_mirror::formatters::{publish, SUMMARY_FILE};
use codebase_mirror::parsers::ner::{EntityTagger, TaggedSpan};
use codebase_mirror::{FileErrorKind, Pipeline, PipelineConfig, RunReport, RunSummary};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn small_project(root: &Path) {
    write(root, "a.py", b"import b\n\ndef main():\n    b.f()\n");
    write(root, "b.py", b"def f():\n    return 1\n");
    write(root, "c.css", b"@import 'b.css';\n");
}

fn config() -> PipelineConfig {
    PipelineConfig {
        workers: 4,
        ..PipelineConfig::default()
    }
}

async fn run(input: &Path, output: &Path, config: PipelineConfig) -> RunReport {
    Pipeline::new(input, output, config)
        .run_to_completion()
        .await
        .unwrap()
}

fn records(output: &Path, stream: &str) -> Vec<AnalysisRecord> {
    let mut records: Vec<AnalysisRecord> = fs::read_to_string(output.join(stream))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));
    records
}

fn sorted_lines(path: &Path) -> Vec<String> {
    let mut lines: Vec<String> = fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}

#[tokio::test]
async fn analyzes_a_small_project_end_to_end() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());

    let report = run(input.path(), output.path(), config()).await;
    let summary = &report.summary;

    assert!(!report.interrupted());
    assert_eq!(summary.aborted, None);
    assert_eq!(summary.files_seen, 3);
    assert_eq!(summary.analyzed, 3);
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.dependency_edges, 1);
    assert_eq!(summary.call_edges, 1);
    assert_eq!(summary.unresolved_calls, 0);
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert_eq!(summary.by_kind[&FileKind::Python].files, 2);
    assert_eq!(summary.by_kind[&FileKind::Python].loc, 6);

    assert_eq!(
        report.graphs.dependencies.edges(),
        vec![("a.py".to_string(), "b.py".to_string(), 1)]
    );
    assert_eq!(
        report.graphs.calls.edges(),
        vec![("a.py::main".to_string(), "b.py::f".to_string(), 1)]
    );

    assert_eq!(report.streams.len(), 1);
    let stream = output.path().join("root.jsonl");
    assert_eq!(verify_stream(&stream).unwrap(), 3);

    let written = records(output.path(), "root.jsonl");
    let paths: Vec<&str> = written.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["a.py", "b.py", "c.css"]);
    assert_eq!(written[2].unresolved_dependencies, vec!["b.css"]);
    assert!(written[0].unresolved_dependencies.is_empty());
}

#[tokio::test]
async fn second_run_reuses_the_cache_and_matches_the_first() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());
    write(input.path(), "pkg/util.py", b"import os\n\ndef helper():\n    return os.getcwd()\n");

    let first = run(input.path(), output.path(), config()).await;
    let first_lines = sorted_lines(&output.path().join("root.jsonl"));
    let first_pkg = sorted_lines(&output.path().join("pkg.jsonl"));

    let second = run(input.path(), output.path(), config()).await;
    assert_eq!(second.summary.cached, 4);
    assert_eq!(second.summary.analyzed, 0);
    assert_eq!(second.summary.records_written, 4);

    assert_eq!(sorted_lines(&output.path().join("root.jsonl")), first_lines);
    assert_eq!(sorted_lines(&output.path().join("pkg.jsonl")), first_pkg);
    assert_eq!(
        first.graphs.dependencies.edges(),
        second.graphs.dependencies.edges()
    );
    assert_eq!(first.graphs.calls.edges(), second.graphs.calls.edges());
}

#[tokio::test]
async fn edited_files_are_reanalyzed() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());

    run(input.path(), output.path(), config()).await;
    write(input.path(), "b.py", b"def f():\n    return 2\n\ndef g():\n    return 3\n");

    let report = run(input.path(), output.path(), config()).await;
    assert_eq!(report.summary.analyzed, 1);
    assert_eq!(report.summary.cached, 2);
    assert!(report.graphs.calls.contains("b.py::g"));
}

#[tokio::test]
async fn disabled_cache_analyzes_everything() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());
    let no_cache = PipelineConfig {
        use_cache: false,
        ..config()
    };

    run(input.path(), output.path(), no_cache.clone()).await;
    let report = run(input.path(), output.path(), no_cache).await;

    assert_eq!(report.summary.analyzed, 3);
    assert_eq!(report.summary.cached, 0);
    assert!(!output.path().join(".cache").exists());
}

#[tokio::test]
async fn oversized_binary_and_unknown_files_become_stubs() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write(input.path(), "a.py", b"x = 1\n");
    write(input.path(), "big.py", &vec![b'#'; 4096]);
    write(input.path(), "logo.png", b"\x89PNG\r\n\x1a\n....");
    write(input.path(), "notes.txt", b"just some words\n");
    write(input.path(), "blob", b"ab\0cd");

    let config = PipelineConfig {
        max_file_size: 1024,
        ..config()
    };
    let report = run(input.path(), output.path(), config).await;
    let summary = &report.summary;

    assert_eq!(summary.files_seen, 5);
    assert_eq!(summary.analyzed, 1);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.records_written, 1);

    let unreadable: Vec<_> = summary.diagnostics_of(FileErrorKind::Unreadable).collect();
    assert_eq!(unreadable.len(), 1);
    assert_eq!(unreadable[0].path, "big.py");

    let unclassifiable: Vec<_> = summary
        .diagnostics_of(FileErrorKind::Unclassifiable)
        .map(|d| d.path.as_str())
        .collect();
    assert_eq!(unclassifiable, vec!["notes.txt"]);

    for stub in ["big.py", "logo.png", "notes.txt", "blob"] {
        assert!(report.graphs.dependencies.node(stub).unwrap().stub, "{stub}");
        assert!(report.graphs.calls.node(stub).unwrap().stub, "{stub}");
    }
    assert_eq!(summary.by_kind[&FileKind::Binary].files, 2);
}

#[tokio::test]
async fn syntax_errors_are_written_as_degraded_records() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write(input.path(), "bad.py", b"def broken(:\n    return 1\n");

    let report = run(input.path(), output.path(), config()).await;

    assert_eq!(report.summary.analyzed, 1);
    assert_eq!(report.summary.records_written, 1);
    let degraded: Vec<_> = report
        .summary
        .diagnostics_of(FileErrorKind::ParseDegraded)
        .collect();
    assert_eq!(degraded.len(), 1);

    let written = records(output.path(), "root.jsonl");
    assert!(written[0].parse_degraded);
    assert!(written[0].entities.is_empty());
}

struct RejectPath(&'static str);

impl RecordSchema for RejectPath {
    fn version(&self) -> &str {
        "test/reject-path@1"
    }

    fn check(&self, record: &AnalysisRecord) -> Vec<String> {
        if record.path == self.0 {
            vec!["rejected by test schema".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[tokio::test]
async fn records_failing_validation_are_not_written() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());

    let report = Pipeline::new(input.path(), output.path(), config())
        .with_schema(Box::new(RejectPath("b.py")))
        .run_to_completion()
        .await
        .unwrap();
    let summary = &report.summary;

    assert_eq!(summary.schema_version, "test/reject-path@1");
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.records_written, 2);
    let failed: Vec<_> = summary
        .diagnostics_of(FileErrorKind::ValidationFailed)
        .map(|d| d.path.as_str())
        .collect();
    assert_eq!(failed, vec!["b.py"]);

    assert!(report.graphs.dependencies.node("b.py").unwrap().stub);
    assert!(!report.graphs.calls.contains("b.py::f"));
    assert_eq!(summary.call_edges, 0);
    assert_eq!(summary.unresolved_calls, 1);

    let paths: Vec<String> = records(output.path(), "root.jsonl")
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(paths, vec!["a.py", "c.css"]);
}

#[tokio::test]
async fn shutdown_before_start_reports_interruption() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());

    let report = Pipeline::new(input.path(), output.path(), config())
        .run(std::future::ready(()))
        .await
        .unwrap();

    assert!(report.interrupted());
    assert_eq!(report.summary.aborted.as_deref(), Some("interrupted"));
    assert_eq!(report.summary.records_written, 0);
    let partials = fs::read_dir(output.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .count();
    assert_eq!(partials, 0);
}

#[tokio::test]
async fn output_inside_the_input_tree_is_not_scanned() {
    let input = tempfile::tempdir().unwrap();
    write(input.path(), "a.py", b"x = 1\n");
    let output = input.path().join("mirror-out");

    run(input.path(), &output, config()).await;
    let report = run(input.path(), &output, config()).await;

    assert_eq!(report.summary.files_seen, 1);
    assert_eq!(report.summary.cached, 1);
    assert!(report
        .graphs
        .dependencies
        .nodes()
        .iter()
        .all(|node| node.path == "a.py"));
}

#[tokio::test]
async fn missing_root_is_fatal() {
    let output = tempfile::tempdir().unwrap();
    let missing = output.path().join("nope");

    let err = Pipeline::new(&missing, output.path(), config())
        .run_to_completion()
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("input root"));
}

#[tokio::test]
async fn invalid_config_is_fatal() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        workers: 0,
        ..config()
    };

    let result = Pipeline::new(input.path(), output.path(), config)
        .run_to_completion()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn analyzed_outcomes_are_counted_per_kind() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write(input.path(), "web/index.html", b"<html><body><p>Hi</p></body></html>\n");
    write(input.path(), "web/app.js", b"import './util';\n");
    write(input.path(), "web/util.js", b"export const x = 1;\n");
    write(input.path(), "README.md", b"# Title\n\nSee [app](web/app.js).\n");

    let report = run(input.path(), output.path(), config()).await;

    assert_eq!(report.summary.analyzed, 4);
    assert_eq!(report.summary.by_kind[&FileKind::Javascript].files, 2);
    assert_eq!(report.summary.by_kind[&FileKind::Markdown].files, 1);
    assert_eq!(
        report.graphs.dependencies.edges(),
        vec![
            ("README.md".to_string(), "web/app.js".to_string(), 1),
            ("web/app.js".to_string(), "web/util.js".to_string(), 1),
        ]
    );
    assert_eq!(verify_stream(&output.path().join("web.jsonl")).unwrap(), 3);
}

#[tokio::test]
async fn functions_without_callers_are_still_call_graph_nodes() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write(input.path(), "a.py", b"import b\n");
    write(input.path(), "b.py", b"def f():\n    pass\n");
    write(input.path(), "c.css", b"@import 'b.css';\n");

    let report = run(input.path(), output.path(), config()).await;

    assert_eq!(
        report.graphs.dependencies.edges(),
        vec![("a.py".to_string(), "b.py".to_string(), 1)]
    );
    assert!(report.graphs.calls.contains("b.py::f"));
    assert!(report.graphs.calls.edges().is_empty());

    let written = records(output.path(), "root.jsonl");
    assert_eq!(written[2].unresolved_dependencies, vec!["b.css"]);
}

fn partial_streams(output: &Path) -> Vec<String> {
    fs::read_dir(output)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".partial"))
        .collect()
}

struct SlowSchema(Duration);

impl RecordSchema for SlowSchema {
    fn version(&self) -> &str {
        "test/slow@1"
    }

    fn check(&self, _record: &AnalysisRecord) -> Vec<String> {
        std::thread::sleep(self.0);
        Vec::new()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_records_already_being_written() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write(input.path(), "a.py", b"def f():\n    return 1\n");

    let report = Pipeline::new(input.path(), output.path(), config())
        .with_schema(Box::new(SlowSchema(Duration::from_millis(1000))))
        .run(tokio::time::sleep(Duration::from_millis(300)))
        .await
        .unwrap();
    let summary = &report.summary;

    assert!(report.interrupted());
    assert_eq!(summary.files_seen, 1);
    assert_eq!(summary.analyzed, 1);
    assert_eq!(summary.records_written, 1);
    assert!(!report.graphs.dependencies.node("a.py").unwrap().stub);
    assert!(report.graphs.calls.contains("a.py::f"));

    assert!(partial_streams(output.path()).is_empty());
    assert_eq!(verify_stream(&output.path().join("root.jsonl")).unwrap(), 1);
}

/// Blocks on any text containing "slow".
struct SlowTagger;

impl EntityTagger for SlowTagger {
    fn tag(&self, text: &str) -> Vec<TaggedSpan> {
        if text.contains("slow") {
            std::thread::sleep(Duration::from_millis(2500));
        }
        Vec::new()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn files_past_the_deadline_fail_without_affecting_others() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write(input.path(), "a.py", b"# slow path\ndef f():\n    pass\n");
    write(input.path(), "b.py", b"def g():\n    return 1\n");

    let config = PipelineConfig {
        file_timeout_secs: 1,
        ..config()
    };
    let report = Pipeline::new(input.path(), output.path(), config)
        .with_tagger(Arc::new(SlowTagger))
        .run_to_completion()
        .await
        .unwrap();
    let summary = &report.summary;

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.analyzed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.records_written, 1);
    let late: Vec<_> = summary
        .diagnostics_of(FileErrorKind::DeadlineExceeded)
        .map(|d| d.path.as_str())
        .collect();
    assert_eq!(late, vec!["a.py"]);

    assert!(report.graphs.dependencies.node("a.py").unwrap().stub);
    assert!(!report.graphs.dependencies.node("b.py").unwrap().stub);
    assert!(!report.graphs.calls.contains("a.py::f"));

    let paths: Vec<String> = records(output.path(), "root.jsonl")
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(paths, vec!["b.py"]);
}

#[tokio::test]
async fn corrupt_cache_entries_are_reported_and_reanalyzed() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());

    let first = run(input.path(), output.path(), config()).await;
    let first_lines = sorted_lines(&output.path().join("root.jsonl"));

    let cache_dir = output.path().join(".cache");
    let mut damaged = 0;
    for entry in fs::read_dir(&cache_dir).unwrap().filter_map(|e| e.ok()) {
        fs::write(entry.path(), b"garbage").unwrap();
        damaged += 1;
    }
    assert_eq!(damaged, first.summary.analyzed);

    let report = run(input.path(), output.path(), config()).await;
    let summary = &report.summary;

    assert_eq!(summary.cached, 0);
    assert_eq!(summary.analyzed, 3);
    assert_eq!(summary.records_written, 3);
    let corrupt: Vec<_> = summary
        .diagnostics_of(FileErrorKind::CacheCorrupt)
        .map(|d| d.path.as_str())
        .collect();
    assert_eq!(corrupt, vec!["a.py", "b.py", "c.css"]);
    assert_eq!(sorted_lines(&output.path().join("root.jsonl")), first_lines);

    // The damaged entries were rewritten.
    let third = run(input.path(), output.path(), config()).await;
    assert_eq!(third.summary.cached, 3);
    assert!(third.summary.diagnostics.is_empty());
}

#[tokio::test]
async fn failed_stream_finalization_names_the_stream() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());
    write(input.path(), "lib/d.py", b"def d():\n    return 2\n");

    fs::create_dir_all(output.path().join("lib.jsonl/blocked")).unwrap();

    let report = run(input.path(), output.path(), config()).await;
    let summary = &report.summary;

    let failed: Vec<_> = summary
        .diagnostics_of(FileErrorKind::WriteFailed)
        .map(|d| d.path.as_str())
        .collect();
    assert_eq!(failed, vec!["lib"]);
    assert_eq!(summary.records_written, 3);
    assert_eq!(report.streams.len(), 1);
    assert!(output.path().join("lib.jsonl.partial").exists());
}

#[tokio::test]
async fn publish_writes_graphs_and_the_summary() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());

    let mut report = run(input.path(), output.path(), config()).await;
    let written = publish(&mut report, output.path()).unwrap();

    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|path| path.exists()));
    let stored: RunSummary =
        serde_json::from_str(&fs::read_to_string(output.path().join(SUMMARY_FILE)).unwrap())
            .unwrap();
    assert_eq!(stored, report.summary);
}

#[tokio::test]
async fn failed_publish_keeps_the_run_summary() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    small_project(input.path());

    let mut report = run(input.path(), output.path(), config()).await;
    // A file where the graph directory should go.
    fs::write(output.path().join("graphs"), b"").unwrap();

    assert!(publish(&mut report, output.path()).is_err());
    let summary = &report.summary;
    assert!(summary.aborted.as_deref().unwrap().contains("graph directory"));
    assert_eq!(summary.files_seen, 3);
    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.call_edges, 1);
}
