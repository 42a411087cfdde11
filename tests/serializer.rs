use codebase_mirror::core::loader::content_hash;
use codebase_mirror::core::{stream_name, verify_stream, AnalysisRecord, FileKind, Metrics, RecordSink};
use codebase_mirror::error::{PipelineError, SerializeError};
use std::fs;
use std::sync::Arc;

fn record(path: &str, module: &str) -> AnalysisRecord {
    AnalysisRecord {
        path: path.to_string(),
        kind: FileKind::Python,
        module: module.to_string(),
        entities: Vec::new(),
        metrics: Metrics::default(),
        content_hash: content_hash(path.as_bytes()),
        parse_degraded: false,
        unresolved_dependencies: Vec::new(),
        loc: 0,
        size_bytes: 0,
    }
}

#[test]
fn stream_names_are_flat_and_safe() {
    assert_eq!(stream_name(""), "root");
    assert_eq!(stream_name("src"), "src");
    assert_eq!(stream_name("src/app"), "src__app");
    assert_eq!(stream_name("my dir/v1.2"), "my_dir__v1.2");
    assert_eq!(stream_name("a/ü"), "a___");
}

#[tokio::test]
async fn concurrent_writes_produce_whole_lines() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordSink::open(dir.path()).unwrap());

    let mut handles = Vec::new();
    for i in 0..50 {
        let sink = sink.clone();
        handles.push(tokio::spawn(async move {
            sink.write(&record(&format!("src/f{i}.py"), "src")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let partial = dir.path().join("src.jsonl.partial");
    assert!(partial.exists());
    assert!(!dir.path().join("src.jsonl").exists());

    let report = sink.finish().await;
    assert!(report.errors.is_empty());
    assert_eq!(report.records_written(), 50);
    assert_eq!(report.streams.len(), 1);
    assert_eq!(report.streams[0].name, "src");

    let stream = dir.path().join("src.jsonl");
    assert_eq!(report.streams[0].path, stream);
    assert!(!partial.exists());
    assert_eq!(verify_stream(&stream).unwrap(), 50);

    let mut paths: Vec<String> = fs::read_to_string(&stream)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<AnalysisRecord>(line).unwrap().path)
        .collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 50);
}

#[tokio::test]
async fn records_are_routed_by_module() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordSink::open(dir.path()).unwrap();

    sink.write(&record("a.py", "")).await.unwrap();
    sink.write(&record("pkg/b.py", "pkg")).await.unwrap();
    sink.write(&record("pkg/sub/c.py", "pkg/sub")).await.unwrap();
    sink.write(&record("pkg/d.py", "pkg")).await.unwrap();

    let report = sink.finish().await;
    let streams: Vec<(&str, usize)> = report
        .streams
        .iter()
        .map(|s| (s.name.as_str(), s.records))
        .collect();
    assert_eq!(streams, vec![("pkg", 2), ("pkg__sub", 1), ("root", 1)]);
}

#[tokio::test]
async fn writes_after_finish_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordSink::open(dir.path()).unwrap();
    sink.write(&record("a.py", "")).await.unwrap();
    sink.finish().await;

    let err = sink.write(&record("b.py", "")).await.unwrap_err();
    assert!(matches!(err, SerializeError::Finalized(name) if name == "root"));
    assert_eq!(verify_stream(&dir.path().join("root.jsonl")).unwrap(), 1);
}

#[test]
fn open_removes_streams_from_an_earlier_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("old.jsonl"), "{}\n").unwrap();
    fs::write(dir.path().join("old.jsonl.partial"), "{").unwrap();
    fs::write(dir.path().join("run_summary.json"), "{}").unwrap();

    let sink = RecordSink::open(dir.path()).unwrap();
    assert_eq!(sink.dir(), dir.path());
    assert!(!dir.path().join("old.jsonl").exists());
    assert!(!dir.path().join("old.jsonl.partial").exists());
    assert!(dir.path().join("run_summary.json").exists());
}

#[test]
fn open_fails_when_output_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("out");
    fs::write(&blocker, "file").unwrap();

    let err = RecordSink::open(&blocker).err().unwrap();
    assert!(matches!(err, PipelineError::OutputUnavailable { .. }));
}

#[test]
fn verify_stream_points_at_the_bad_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("root.jsonl");
    let good = serde_json::to_string(&record("a.py", "")).unwrap();
    fs::write(&path, format!("{good}\n{{\"path\": 1}}\n")).unwrap();

    match verify_stream(&path) {
        Err(SerializeError::Invalid { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected an invalid line, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_finalization_names_the_stream_and_keeps_the_partial() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordSink::open(dir.path()).unwrap();
    sink.write(&record("lib/a.py", "lib")).await.unwrap();
    sink.write(&record("b.py", "")).await.unwrap();

    // A directory in the way of the rename.
    fs::create_dir(dir.path().join("lib.jsonl")).unwrap();
    fs::write(dir.path().join("lib.jsonl/keep"), b"").unwrap();

    let report = sink.finish().await;
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].name, "lib");
    assert!(matches!(
        &report.errors[0].error,
        SerializeError::Write { stream, .. } if stream == "lib"
    ));
    assert_eq!(report.streams.len(), 1);
    assert_eq!(report.streams[0].name, "root");
    assert!(dir.path().join("lib.jsonl.partial").exists());
}
